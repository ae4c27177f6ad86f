//! Attendance repository and the check-in/check-out state machine.
//!
//! State per identity is inferred from its most recent record: an unset
//! check-out means the identity is currently checked in. The transition
//! runs read-last + write inside one immediate transaction, so the "at most
//! one open record per identity" invariant holds under concurrent requests.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use timeclock_geo::Coordinate;

use crate::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum TransitionAction {
    CheckIn,
    CheckOut,
}

/// Outcome of a state-machine transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: TransitionAction,
    pub record_id: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub identity_id: i64,
    pub check_in: DateTime<Utc>,
    pub check_in_latitude: Option<f64>,
    pub check_in_longitude: Option<f64>,
    pub check_in_address: Option<String>,
    pub check_out: Option<DateTime<Utc>>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub check_out_address: Option<String>,
}

const RECORD_COLUMNS: &str = "id, identity_id, check_in, check_in_latitude, check_in_longitude,
    check_in_address, check_out, check_out_latitude, check_out_longitude, check_out_address";

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn record_from_row(row: &Row<'_>) -> Result<AttendanceRecord, rusqlite::Error> {
    let check_in: String = row.get(2)?;
    let check_out: Option<String> = row.get(6)?;
    Ok(AttendanceRecord {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        check_in: parse_timestamp(&check_in)?,
        check_in_latitude: row.get(3)?,
        check_in_longitude: row.get(4)?,
        check_in_address: row.get(5)?,
        check_out: check_out.as_deref().map(parse_timestamp).transpose()?,
        check_out_latitude: row.get(7)?,
        check_out_longitude: row.get(8)?,
        check_out_address: row.get(9)?,
    })
}

impl Store {
    /// Most recent attendance record for the identity, by check-in time.
    pub fn last_attendance(&self, identity_id: i64) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM attendance
                     WHERE identity_id = ?1 ORDER BY check_in DESC LIMIT 1"
                ),
                params![identity_id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Recent records for the identity, newest first.
    pub fn attendance_for_identity(
        &self,
        identity_id: i64,
        limit: usize,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance
             WHERE identity_id = ?1 ORDER BY check_in DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![identity_id, limit as i64], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of currently open records for the identity.
    pub fn open_record_count(&self, identity_id: i64) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE identity_id = ?1 AND check_out IS NULL",
            params![identity_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Run one state-machine transition for the identity.
    ///
    /// If an open record exists (necessarily the most recent one), it is
    /// closed with the check-out fields; otherwise a new record is created
    /// with the check-in fields. Guarding on the open record rather than on
    /// "newest by check-in" is what keeps the at-most-one-open invariant
    /// intact even if clocks skew between requests. Both paths commit
    /// atomically; no partial write is observable.
    pub fn transition(
        &self,
        identity_id: i64,
        now: DateTime<Utc>,
        position: Option<Coordinate>,
        address: &str,
    ) -> Result<Transition, StoreError> {
        let (latitude, longitude) = match position {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let open: Option<i64> = tx
            .query_row(
                "SELECT id FROM attendance
                 WHERE identity_id = ?1 AND check_out IS NULL
                 ORDER BY check_in DESC LIMIT 1",
                params![identity_id],
                |row| row.get(0),
            )
            .optional()?;

        let transition = match open {
            Some(record_id) => {
                tx.execute(
                    "UPDATE attendance SET check_out = ?2, check_out_latitude = ?3,
                         check_out_longitude = ?4, check_out_address = ?5
                     WHERE id = ?1",
                    params![record_id, now.to_rfc3339(), latitude, longitude, address],
                )?;
                Transition { action: TransitionAction::CheckOut, record_id, at: now }
            }
            None => {
                tx.execute(
                    "INSERT INTO attendance (identity_id, check_in, check_in_latitude,
                         check_in_longitude, check_in_address)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![identity_id, now.to_rfc3339(), latitude, longitude, address],
                )?;
                let record_id = tx.last_insert_rowid();
                Transition { action: TransitionAction::CheckIn, record_id, at: now }
            }
        };

        tx.commit()?;
        tracing::info!(
            identity_id,
            record_id = transition.record_id,
            action = ?transition.action,
            "attendance transition recorded"
        );
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::{Arc, Barrier};

    fn store_with_identity() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_identity("acme", "Alice").unwrap().id;
        (store, id)
    }

    #[test]
    fn check_in_then_check_out_closes_one_record() {
        let (store, id) = store_with_identity();
        let t0 = Utc::now();
        let position = Some(Coordinate::new(10.0, 10.0));

        let first = store.transition(id, t0, position, "HQ lobby").unwrap();
        assert_eq!(first.action, TransitionAction::CheckIn);

        let second = store
            .transition(id, t0 + Duration::hours(8), position, "HQ lobby")
            .unwrap();
        assert_eq!(second.action, TransitionAction::CheckOut);
        assert_eq!(second.record_id, first.record_id);

        let records = store.attendance_for_identity(id, 10).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.check_out.is_some());
        assert_eq!(record.check_in_address.as_deref(), Some("HQ lobby"));
        assert_eq!(record.check_out_address.as_deref(), Some("HQ lobby"));
        assert_eq!(record.check_in_latitude, Some(10.0));
    }

    #[test]
    fn transition_after_closed_record_opens_new_one() {
        let (store, id) = store_with_identity();
        let t0 = Utc::now();

        store.transition(id, t0, None, "a").unwrap();
        store.transition(id, t0 + Duration::hours(1), None, "b").unwrap();

        // "Second check-out attempt" is inferred as a fresh check-in.
        let third = store.transition(id, t0 + Duration::hours(2), None, "c").unwrap();
        assert_eq!(third.action, TransitionAction::CheckIn);

        assert_eq!(store.attendance_for_identity(id, 10).unwrap().len(), 2);
        assert_eq!(store.open_record_count(id).unwrap(), 1);
    }

    #[test]
    fn missing_position_stores_nulls() {
        let (store, id) = store_with_identity();
        store.transition(id, Utc::now(), None, "Location not provided").unwrap();

        let record = store.last_attendance(id).unwrap().unwrap();
        assert_eq!(record.check_in_latitude, None);
        assert_eq!(record.check_in_longitude, None);
    }

    #[test]
    fn last_attendance_orders_by_check_in() {
        let (store, id) = store_with_identity();
        let t0 = Utc::now();

        store.transition(id, t0, None, "a").unwrap();
        store.transition(id, t0 + Duration::hours(1), None, "a").unwrap();
        store.transition(id, t0 + Duration::hours(2), None, "b").unwrap();

        let last = store.last_attendance(id).unwrap().unwrap();
        assert_eq!(last.check_in, t0 + Duration::hours(2));
        assert!(last.check_out.is_none());
    }

    #[test]
    fn concurrent_transitions_never_double_open() {
        let (store, id) = store_with_identity();
        let store = Arc::new(store);

        let threads = 8;
        let rounds = 4;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    for r in 0..rounds {
                        let at = Utc::now() + Duration::seconds((t * rounds + r) as i64);
                        store.transition(id, at, None, "somewhere").unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // An even number of transitions must leave no open record, and can
        // never leave more than one regardless of interleaving.
        assert!(store.open_record_count(id).unwrap() <= 1);
        assert_eq!(store.open_record_count(id).unwrap(), 0);
        let records = store.attendance_for_identity(id, 100).unwrap();
        assert_eq!(records.len(), threads * rounds / 2);
    }
}
