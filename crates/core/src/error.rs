use crate::db::Rid;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record `{0}` not found")]
    NotFound(Rid),
    #[error("record `{0}` already exists")]
    Duplicate(Rid),
    #[error("attribute `{0}` is missing")]
    KeyMissing(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("malformed predicate: {0}")]
    BadPredicate(String),
    #[error("limit and offset must be non-negative, got {0}")]
    BadOrdering(i64),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction already committed or rolled back")]
    Closed,
}

#[derive(Error, Debug)]
pub enum DBError {
    #[error("RecordError: {0}")]
    Record(#[from] RecordError),
    #[error("QueryError: {0}")]
    Query(#[from] QueryError),
    #[error("TxError: {0}")]
    Tx(#[from] TxError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DBError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Record(RecordError::NotFound(_)))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Record(RecordError::Duplicate(_)))
    }

    pub fn is_key_missing(&self) -> bool {
        matches!(self, Self::Record(RecordError::KeyMissing(_)))
    }

    pub fn is_closed_tx(&self) -> bool {
        matches!(self, Self::Tx(TxError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, DBError>;
