use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("deployment already exists")]
    Conflict,

    #[error("deployment not found")]
    NotFound,

    #[error("version not monotone")]
    VersionNotMonotone,

    #[error("rocksdb error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("corrupt record at key {0:?}: {1}")]
    Corrupt(Vec<u8>, String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for provisiond_types::EngineError {
    fn from(err: StoreError) -> Self {
        use provisiond_types::EngineError;
        match err {
            StoreError::Conflict => EngineError::Conflict,
            StoreError::NotFound => EngineError::NotFound,
            StoreError::VersionNotMonotone => EngineError::VersionNotMonotone,
            other => EngineError::Store(other.to_string()),
        }
    }
}
