//! SQLite roster store for recruited units.
//!
//! Each [`RecruitedUnit`] is serialised to JSON and kept in one row:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS roster (
//!     unit_id        TEXT PRIMARY KEY,
//!     recruitment_id TEXT NOT NULL,
//!     stage_id       TEXT NOT NULL,
//!     data           BLOB NOT NULL,
//!     recruited_at   TEXT NOT NULL,
//!     checksum       TEXT
//! );
//! ```
//!
//! A CRC-32 of the JSON is stored when checksums are enabled. On load a
//! mismatch is logged, or rejected when `strict_checksums` is set.

use std::path::{Path, PathBuf};
use std::time::Instant;

use recruit_core::metrics::spans;
use recruit_core::{RecruitedUnit, UnitId};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, warn};

use crate::error::{BattleError, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS roster (
    unit_id        TEXT PRIMARY KEY,
    recruitment_id TEXT NOT NULL,
    stage_id       TEXT NOT NULL,
    data           BLOB NOT NULL,
    recruited_at   TEXT NOT NULL,
    checksum       TEXT
);";

// ---------------------------------------------------------------------------
// CRC-32
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309), bitwise.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Roster store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterStoreConfig {
    /// Store a checksum with every row.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Fail loads on checksum mismatch instead of warning.
    #[serde(default)]
    pub strict_checksums: bool,
    /// Use WAL journaling for file databases.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for RosterStoreConfig {
    fn default() -> Self {
        Self {
            checksum_enabled: true,
            strict_checksums: false,
            wal_mode: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to an open roster database.
pub struct RosterStore {
    conn: Connection,
    config: RosterStoreConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for RosterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RosterStore {
    /// Open (or create) a roster database at `path`.
    ///
    /// # Errors
    /// Returns [`BattleError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &RosterStoreConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Roster store opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`BattleError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &RosterStoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Save (upsert) one recruit.
    ///
    /// # Errors
    /// Serialization or SQLite failures.
    pub fn save(&self, recruit: &RecruitedUnit) -> Result<()> {
        save_row(&self.conn, &self.config, recruit)
    }

    /// Save many recruits in one transaction. Returns how many were written.
    ///
    /// # Errors
    /// Serialization or SQLite failures; nothing is written on error.
    pub fn save_all(&mut self, recruits: &[RecruitedUnit]) -> Result<usize> {
        if recruits.is_empty() {
            return Ok(0);
        }
        let _span = debug_span!(spans::ROSTER_SAVE, count = recruits.len()).entered();
        let start = Instant::now();
        let tx = self.conn.transaction()?;
        for recruit in recruits {
            save_row(&tx, &self.config, recruit)?;
        }
        tx.commit()?;
        debug!(
            count = recruits.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Roster batch saved"
        );
        Ok(recruits.len())
    }

    /// Load one recruit by unit id.
    ///
    /// # Errors
    /// Serialization, checksum (strict mode) or SQLite failures.
    pub fn load(&self, unit_id: &UnitId) -> Result<Option<RecruitedUnit>> {
        let row: Option<(Vec<u8>, Option<String>)> = self
            .conn
            .prepare_cached("SELECT data, checksum FROM roster WHERE unit_id = ?1")?
            .query_row(params![unit_id.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        row.map(|(data, checksum)| self.decode(unit_id, &data, checksum.as_deref()))
            .transpose()
    }

    /// Every stored recruit, oldest first.
    ///
    /// # Errors
    /// Serialization, checksum (strict mode) or SQLite failures.
    pub fn load_all(&self) -> Result<Vec<RecruitedUnit>> {
        let _span = debug_span!(spans::ROSTER_LOAD).entered();
        let start = Instant::now();
        let mut stmt = self.conn.prepare_cached(
            "SELECT unit_id, data, checksum FROM roster ORDER BY recruited_at, unit_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut roster = Vec::new();
        for row in rows {
            let (id, data, checksum) = row?;
            roster.push(self.decode(&UnitId::from(id), &data, checksum.as_deref())?);
        }
        debug!(
            count = roster.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Roster loaded"
        );
        Ok(roster)
    }

    /// Remove a recruit. Returns whether a row was deleted.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn delete(&self, unit_id: &UnitId) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM roster WHERE unit_id = ?1", params![unit_id.as_str()])?;
        Ok(n > 0)
    }

    /// Number of stored recruits.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM roster", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(10), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Roster backup completed"
        );
        Ok(())
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Path of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn decode(&self, unit_id: &UnitId, data: &[u8], stored: Option<&str>) -> Result<RecruitedUnit> {
        if self.config.checksum_enabled
            && let Some(expected) = stored
        {
            let actual = crc32_hex(data);
            if expected != actual {
                if self.config.strict_checksums {
                    return Err(BattleError::ChecksumMismatch {
                        unit: unit_id.clone(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
                warn!(
                    unit = %unit_id,
                    expected,
                    actual = %actual,
                    "Roster checksum mismatch, possible save corruption"
                );
            }
        }
        serde_json::from_slice(data).map_err(|e| BattleError::Serialization(e.to_string()))
    }
}

fn save_row(conn: &Connection, config: &RosterStoreConfig, recruit: &RecruitedUnit) -> Result<()> {
    let json = serde_json::to_vec(recruit).map_err(|e| BattleError::Serialization(e.to_string()))?;
    let checksum = config.checksum_enabled.then(|| crc32_hex(&json));

    conn.execute(
        "INSERT INTO roster (unit_id, recruitment_id, stage_id, data, recruited_at, checksum)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(unit_id) DO UPDATE SET
            recruitment_id = excluded.recruitment_id,
            stage_id = excluded.stage_id,
            data = excluded.data,
            recruited_at = excluded.recruited_at,
            checksum = excluded.checksum",
        params![
            recruit.unit.id.as_str(),
            recruit.recruitment_id.0.to_string(),
            recruit.stage_id,
            json,
            recruit.recruited_at.to_rfc3339(),
            checksum,
        ],
    )?;
    debug!(unit = %recruit.unit.id, bytes = json.len(), "Recruit saved");
    Ok(())
}
