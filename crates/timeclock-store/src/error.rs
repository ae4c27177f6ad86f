use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{entity} not found: id {id}")]
    NotFound { entity: &'static str, id: i64 },
}
