use rusqlite::{Connection, Result};

/// Initialise the event tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_events_table(conn)?;
    create_reminders_table(conn)?;
    Ok(())
}

fn create_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            description TEXT,
            occurs_at   TEXT NOT NULL,   -- RFC3339, UTC
            recipient   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}

/// One row per (event, lead time). Rows go away with their event.
fn create_reminders_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminders (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id     INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            lead_minutes INTEGER NOT NULL CHECK (lead_minutes >= 0),
            UNIQUE(event_id, lead_minutes)
        );
        CREATE INDEX IF NOT EXISTS idx_reminders_event
            ON reminders(event_id);",
    )
}
