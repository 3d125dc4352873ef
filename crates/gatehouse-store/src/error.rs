//! Error type for `gatehouse-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("uuid parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] gatehouse_core::DescriptorError),

    #[error("unknown person kind: {0}")]
    UnknownKind(String),

    #[error("unknown audit action: {0}")]
    UnknownAction(String),

    /// The open-session uniqueness index rejected an insert: the person
    /// already has an open session at the site.
    #[error("person {0} already has an open session")]
    OpenSessionConflict(uuid::Uuid),

    #[error("national id {0} is already registered at this site")]
    NationalIdTaken(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("descriptor encryption failed")]
    Encrypt,

    /// Wrong key, truncated blob, or tampered ciphertext.
    #[error("descriptor decryption failed")]
    Decrypt,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
