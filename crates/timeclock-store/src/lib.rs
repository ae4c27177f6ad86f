//! timeclock-store — SQLite persistence.
//!
//! One [`Store`] handle owns the connection; repository methods live in the
//! entity modules (`identity`, `attendance`, `zones`) as explicit queries.
//! Schema migration runs on open.

pub mod attendance;
pub mod error;
pub mod identity;
pub mod zones;

pub use attendance::{AttendanceRecord, Transition, TransitionAction};
pub use error::StoreError;
pub use identity::Identity;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id              INTEGER PRIMARY KEY,
    scope           TEXT NOT NULL,
    name            TEXT NOT NULL,
    reference_image BLOB,
    face_encoding   TEXT,
    active          INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS attendance (
    id                  INTEGER PRIMARY KEY,
    identity_id         INTEGER NOT NULL REFERENCES identities(id),
    check_in            TEXT NOT NULL,
    check_in_latitude   REAL,
    check_in_longitude  REAL,
    check_in_address    TEXT,
    check_out           TEXT,
    check_out_latitude  REAL,
    check_out_longitude REAL,
    check_out_address   TEXT
);

CREATE INDEX IF NOT EXISTS idx_attendance_identity_check_in
    ON attendance (identity_id, check_in DESC);

CREATE TABLE IF NOT EXISTS zones (
    id        INTEGER PRIMARY KEY,
    scope     TEXT NOT NULL,
    name      TEXT NOT NULL,
    latitude  REAL NOT NULL,
    longitude REAL NOT NULL,
    radius_m  REAL NOT NULL
);
";

/// Central database handle. Cheap to share behind an `Arc`; the inner
/// connection is serialized by a mutex.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("store schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }
}
