//! Embedding provider seam: turns a captured frame into a descriptor.

use std::future::Future;

use thiserror::Error;

use crate::descriptor::Descriptor;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    #[error("embedding failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A captured grayscale camera frame, as delivered by the gate hardware.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Computes a face descriptor from a frame.
///
/// The embedding model itself lives outside this crate; implementations
/// wrap whatever runtime hosts it. `Ok(None)` means the frame contained no
/// usable face, which is an expected outcome, not an error.
pub trait DescriptorProvider: Send + Sync {
    fn descriptor<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<Option<Descriptor>, ProviderError>> + Send + 'a;
}
