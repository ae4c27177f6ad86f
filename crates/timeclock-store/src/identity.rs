//! Identity repository: enrolled employees and their stored encodings.

use rusqlite::{params, OptionalExtension, Row};
use timeclock_core::{FaceEncoding, GalleryEntry};

use crate::{Store, StoreError};

/// An enrolled (or enrollable) person.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub scope: String,
    pub name: String,
    pub active: bool,
    pub has_reference_image: bool,
    pub has_encoding: bool,
}

fn identity_from_row(row: &Row<'_>) -> Result<Identity, rusqlite::Error> {
    Ok(Identity {
        id: row.get(0)?,
        scope: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        has_reference_image: row.get(4)?,
        has_encoding: row.get(5)?,
    })
}

const IDENTITY_COLUMNS: &str = "id, scope, name, active != 0,
    reference_image IS NOT NULL, face_encoding IS NOT NULL AND face_encoding != ''";

impl Store {
    pub fn create_identity(&self, scope: &str, name: &str) -> Result<Identity, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO identities (scope, name) VALUES (?1, ?2)",
            params![scope, name],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(identity_id = id, name, scope, "identity created");
        Ok(Identity {
            id,
            scope: scope.to_string(),
            name: name.to_string(),
            active: true,
            has_reference_image: false,
            has_encoding: false,
        })
    }

    pub fn identity(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn();
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1"),
                params![id],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    pub fn list_identities(&self, scope: &str) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE scope = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![scope], identity_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE identities SET active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { entity: "identity", id });
        }
        Ok(())
    }

    /// Attach a reference photo to the identity. Encoding generation is a
    /// separate, explicit step (`store_encoding`) driven by the caller.
    pub fn set_reference_image(&self, id: i64, image: &[u8]) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE identities SET reference_image = ?2 WHERE id = ?1",
            params![id, image],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { entity: "identity", id });
        }
        Ok(())
    }

    pub fn reference_image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn();
        let image: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT reference_image FROM identities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        image.ok_or(StoreError::NotFound { entity: "identity", id })
    }

    /// Persist the identity's face encoding in its at-rest base64 form.
    pub fn store_encoding(&self, id: i64, encoding: &FaceEncoding) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE identities SET face_encoding = ?2 WHERE id = ?1",
            params![id, encoding.to_base64()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { entity: "identity", id });
        }
        tracing::info!(identity_id = id, "face encoding stored");
        Ok(())
    }

    /// Clear the stored encoding; the identity drops out of matching but
    /// stays intact otherwise.
    pub fn clear_encoding(&self, id: i64) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE identities SET face_encoding = NULL WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { entity: "identity", id });
        }
        tracing::info!(identity_id = id, "face encoding cleared");
        Ok(())
    }

    /// The matching gallery: active identities in scope with a stored
    /// encoding. Encodings stay base64 until compared.
    pub fn gallery(&self, scope: &str) -> Result<Vec<GalleryEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, face_encoding FROM identities
             WHERE scope = ?1 AND active != 0
               AND face_encoding IS NOT NULL AND face_encoding != ''
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok(GalleryEntry {
                identity_id: row.get(0)?,
                name: row.get(1)?,
                encoding: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Identities that have a reference image on file, for bulk re-encoding.
    pub fn identities_with_reference_image(&self, scope: &str) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM identities
             WHERE scope = ?1 AND reference_image IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
