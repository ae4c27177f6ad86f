//! Geofence zone repository. Zones are administrator-managed; the pipeline
//! only reads them.

use rusqlite::params;
use timeclock_geo::{Coordinate, GeofenceZone};

use crate::{Store, StoreError};

impl Store {
    pub fn add_zone(
        &self,
        scope: &str,
        name: &str,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<GeofenceZone, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO zones (scope, name, latitude, longitude, radius_m)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![scope, name, center.latitude, center.longitude, radius_m],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(zone_id = id, name, scope, radius_m, "zone added");
        Ok(GeofenceZone {
            id,
            scope: scope.to_string(),
            name: name.to_string(),
            center,
            radius_m,
        })
    }

    pub fn remove_zone(&self, id: i64) -> Result<(), StoreError> {
        let removed = self.conn().execute("DELETE FROM zones WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound { entity: "zone", id });
        }
        Ok(())
    }

    /// All zones configured for the scope. An empty result disables
    /// geofencing for that scope.
    pub fn zones_for_scope(&self, scope: &str) -> Result<Vec<GeofenceZone>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, scope, name, latitude, longitude, radius_m
             FROM zones WHERE scope = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok(GeofenceZone {
                id: row.get(0)?,
                scope: row.get(1)?,
                name: row.get(2)?,
                center: Coordinate::new(row.get(3)?, row.get(4)?),
                radius_m: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zones_are_scoped() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_zone("acme", "HQ", Coordinate::new(10.0, 10.0), 100.0)
            .unwrap();
        store
            .add_zone("globex", "Plant", Coordinate::new(20.0, 20.0), 50.0)
            .unwrap();

        let zones = store.zones_for_scope("acme").unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "HQ");
        assert_eq!(zones[0].radius_m, 100.0);

        assert!(store.zones_for_scope("initech").unwrap().is_empty());
    }

    #[test]
    fn remove_zone_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let zone = store
            .add_zone("acme", "HQ", Coordinate::new(10.0, 10.0), 100.0)
            .unwrap();

        store.remove_zone(zone.id).unwrap();
        assert!(store.zones_for_scope("acme").unwrap().is_empty());
        assert!(matches!(
            store.remove_zone(zone.id),
            Err(StoreError::NotFound { entity: "zone", .. })
        ));
    }
}
