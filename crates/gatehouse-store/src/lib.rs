//! SQLite backend for the Gatehouse access store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Stored descriptors can be
//! encrypted at rest with AES-256-GCM.

mod crypto;
mod encode;
mod schema;
mod store;

pub mod error;

pub use crypto::DescriptorCipher;
pub use error::{Error, Result};
pub use store::SqliteStore;
