use rusqlite::Connection;

use crate::error::Result;

/// Initialise the notification ledger schema in `conn`.
///
/// Ledger rows reference `events`, so the event tables are created first.
/// The partial unique index lets storage itself refuse a second `sent`
/// entry for the same (event, lead time, channel).
pub fn init_db(conn: &Connection) -> Result<()> {
    agenda_events::db::init_db(conn)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notifications (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id     INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            lead_minutes INTEGER NOT NULL,
            channel      TEXT    NOT NULL,
            status       TEXT    NOT NULL DEFAULT 'pending',
            sent_at      TEXT,               -- RFC3339 or NULL while pending
            error        TEXT,               -- only on failed
            created_at   TEXT    NOT NULL
        );

        -- Dedup lookup: WHERE event_id = ? AND lead_minutes = ? AND channel = ? AND status = 'sent'
        CREATE INDEX IF NOT EXISTS idx_notifications_key
            ON notifications (event_id, lead_minutes, channel, status);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_one_sent
            ON notifications (event_id, lead_minutes, channel)
            WHERE status = 'sent';
        ",
    )?;
    Ok(())
}
