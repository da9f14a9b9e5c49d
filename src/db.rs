use crate::grading::{GradingScale, ValidatedScale};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DB_FILE: &str = "gradingd.sqlite3";
pub const GRADING_SCALE_KEY: &str = "grading.scale";

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
        "CREATE TABLE IF NOT EXISTS grading_scale_revisions(
            revision INTEGER PRIMARY KEY AUTOINCREMENT,
            scale_json TEXT NOT NULL,
            band_count INTEGER NOT NULL,
            saved_at TEXT NOT NULL
        )",
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
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings[{key}] is not valid JSON"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoredScale {
    pub scale: GradingScale,
    pub revision: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSummary {
    pub revision: i64,
    pub band_count: i64,
    pub saved_at: String,
}

pub fn latest_revision(conn: &Connection) -> anyhow::Result<Option<i64>> {
    let rev: Option<i64> = conn.query_row(
        "SELECT MAX(revision) FROM grading_scale_revisions",
        [],
        |r| r.get(0),
    )?;
    Ok(rev)
}

pub fn load_grading_scale(conn: &Connection) -> anyhow::Result<Option<StoredScale>> {
    let Some(raw) = settings_get_json(conn, GRADING_SCALE_KEY)? else {
        return Ok(None);
    };
    let scale = GradingScale::from_json(&raw).context("stored grading scale is malformed")?;
    Ok(Some(StoredScale {
        scale,
        revision: latest_revision(conn)?,
    }))
}

pub fn save_grading_scale(conn: &Connection, scale: &ValidatedScale) -> anyhow::Result<i64> {
    let stored: BTreeMap<_, _> = scale.to_scale().to_stored();
    let value = serde_json::to_value(&stored)?;
    let saved_at = chrono::Utc::now().to_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO grading_scale_revisions(scale_json, band_count, saved_at) VALUES(?, ?, ?)",
        (value.to_string(), scale.bands().len() as i64, &saved_at),
    )?;
    let revision = tx.last_insert_rowid();
    settings_set_json(&tx, GRADING_SCALE_KEY, &value)?;
    tx.commit()?;
    Ok(revision)
}

pub fn grading_scale_revisions(conn: &Connection, limit: i64) -> anyhow::Result<Vec<RevisionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT revision, band_count, saved_at FROM grading_scale_revisions
         ORDER BY revision DESC LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(RevisionSummary {
                revision: row.get(0)?,
                band_count: row.get(1)?,
                saved_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
