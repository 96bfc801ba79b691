use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

pub const DB_FILE: &str = "gradesheet.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS save_journal(
            batch_id TEXT PRIMARY KEY,
            sheet TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            row_offset INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_save_journal_created ON save_journal(created_at)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub batch_id: String,
    pub sheet: String,
    pub row_count: i64,
    pub row_offset: i64,
    /// "saved", "partial" or "failed".
    pub outcome: String,
    pub message: Option<String>,
    pub created_at: String,
}

pub fn journal_append(conn: &Connection, entry: &JournalEntry) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO save_journal(batch_id, sheet, row_count, row_offset, outcome, message, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.batch_id,
            &entry.sheet,
            entry.row_count,
            entry.row_offset,
            &entry.outcome,
            &entry.message,
            &entry.created_at,
        ),
    )?;
    Ok(())
}

pub fn journal_list(conn: &Connection, limit: i64) -> anyhow::Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT batch_id, sheet, row_count, row_offset, outcome, message, created_at
         FROM save_journal
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let entries = stmt
        .query_map([limit], |r| {
            Ok(JournalEntry {
                batch_id: r.get(0)?,
                sheet: r.get(1)?,
                row_count: r.get(2)?,
                row_offset: r.get(3)?,
                outcome: r.get(4)?,
                message: r.get(5)?,
                created_at: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}
