use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use agenda_core::{Event, Reminder};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{EventError, Result};

const EVENT_SELECT_SQL: &str =
    "SELECT id, title, description, occurs_at, recipient FROM events";

/// Durable home of events and their reminders.
///
/// Thread-safe: wraps its own SQLite connection in a Mutex, so the HTTP layer
/// and the scheduler can each hold a store without sharing a connection.
pub struct EventStore {
    db: Mutex<Connection>,
}

impl EventStore {
    /// Wrap `conn`, enabling foreign keys (needed for cascading deletes) and
    /// creating the tables if they do not exist yet.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist a new event with its reminders and return it with `id` filled in.
    pub fn create(&self, event: &Event) -> Result<Event> {
        let mut db = self.conn();
        let now = Utc::now().to_rfc3339();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO events (title, description, occurs_at, recipient, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                event.title,
                event.description,
                event.occurs_at.to_rfc3339(),
                event.recipient,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_reminders(&tx, id, &event.reminders)?;
        tx.commit()?;

        info!(event_id = id, reminders = event.reminders.len(), "event created");
        let mut created = event.clone();
        created.id = Some(id);
        Ok(created)
    }

    pub fn get(&self, id: i64) -> Result<Event> {
        let db = self.conn();
        let row = db
            .query_row(
                &format!("{EVENT_SELECT_SQL} WHERE id = ?1"),
                [id],
                row_to_event,
            )
            .optional()?;
        let mut event = row.ok_or(EventError::NotFound { id })??;
        event.reminders = load_reminders(&db, id)?;
        Ok(event)
    }

    /// Every event with its reminders, ordered by id.
    pub fn list_all(&self) -> Result<Vec<Event>> {
        let db = self.conn();

        let mut events: BTreeMap<i64, Event> = BTreeMap::new();
        {
            let mut stmt = db.prepare_cached(&format!("{EVENT_SELECT_SQL} ORDER BY id"))?;
            let rows = stmt.query_map([], row_to_event)?;
            for row in rows {
                let event = row??;
                if let Some(id) = event.id {
                    events.insert(id, event);
                }
            }
        }

        let mut stmt = db.prepare_cached(
            "SELECT event_id, lead_minutes FROM reminders ORDER BY event_id, lead_minutes",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (event_id, minutes) = row?;
            if let Some(event) = events.get_mut(&event_id) {
                event.reminders.push(to_reminder(minutes)?);
            }
        }

        debug!(count = events.len(), "listed events");
        Ok(events.into_values().collect())
    }

    /// Replace an event's fields and its whole reminder set.
    pub fn update(&self, id: i64, event: &Event) -> Result<Event> {
        let mut db = self.conn();
        let now = Utc::now().to_rfc3339();
        let tx = db.transaction()?;
        let n = tx.execute(
            "UPDATE events SET title = ?1, description = ?2, occurs_at = ?3,
             recipient = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                event.title,
                event.description,
                event.occurs_at.to_rfc3339(),
                event.recipient,
                now,
                id
            ],
        )?;
        if n == 0 {
            return Err(EventError::NotFound { id });
        }
        tx.execute("DELETE FROM reminders WHERE event_id = ?1", [id])?;
        insert_reminders(&tx, id, &event.reminders)?;
        tx.commit()?;

        info!(event_id = id, reminders = event.reminders.len(), "event updated");
        let mut updated = event.clone();
        updated.id = Some(id);
        Ok(updated)
    }

    /// Delete an event; its reminders and ledger entries go with it.
    pub fn delete(&self, id: i64) -> Result<()> {
        let db = self.conn();
        let n = db.execute("DELETE FROM events WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(EventError::NotFound { id });
        }
        info!(event_id = id, "event deleted");
        Ok(())
    }
}

fn insert_reminders(tx: &Transaction<'_>, event_id: i64, reminders: &[Reminder]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO reminders (event_id, lead_minutes) VALUES (?1, ?2)",
    )?;
    for reminder in reminders {
        stmt.execute(params![event_id, reminder.lead_minutes()])?;
    }
    Ok(())
}

fn load_reminders(db: &Connection, event_id: i64) -> Result<Vec<Reminder>> {
    let mut stmt = db.prepare_cached(
        "SELECT lead_minutes FROM reminders WHERE event_id = ?1 ORDER BY lead_minutes",
    )?;
    let rows = stmt.query_map([event_id], |row| row.get::<_, i64>(0))?;
    let mut reminders = Vec::new();
    for minutes in rows {
        reminders.push(to_reminder(minutes?)?);
    }
    Ok(reminders)
}

fn to_reminder(minutes: i64) -> Result<Reminder> {
    Reminder::new(minutes).map_err(|e| EventError::Corrupt(e.to_string()))
}

/// Map a row (column order from EVENT_SELECT_SQL) to an Event without reminders.
///
/// The outer `rusqlite::Result` carries column access errors; the inner one a
/// timestamp that does not parse.
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Event>> {
    let id: i64 = row.get(0)?;
    let occurs_at: String = row.get(3)?;
    let occurs_at = match DateTime::parse_from_rfc3339(&occurs_at) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            return Ok(Err(EventError::Corrupt(format!(
                "event {id}: bad occurs_at {occurs_at:?}: {e}"
            ))))
        }
    };
    Ok(Ok(Event {
        id: Some(id),
        title: row.get(1)?,
        description: row.get(2)?,
        occurs_at,
        recipient: row.get(4)?,
        reminders: Vec::new(),
    }))
}
