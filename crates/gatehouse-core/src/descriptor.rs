//! Face descriptor vector and its interchange codecs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor component {index} is not finite")]
    NotFinite { index: usize },
    #[error("descriptor blob length {0} is not a multiple of 4")]
    TruncatedBlob(usize),
    #[error("descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Face descriptor: a fixed-length embedding vector (typically 128-dimensional).
///
/// Descriptors are produced by an external embedding model and compared by
/// Euclidean distance. Construction validates that the vector is non-empty
/// and every component is finite; a validated descriptor is immutable.
///
/// Serialized form is a bare JSON array of floats, the interchange format
/// enrollment clients already produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        for (index, v) in values.iter().enumerate() {
            if !v.is_finite() {
                return Err(DescriptorError::NotFinite { index });
            }
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to `other`.
    ///
    /// Callers must ensure both descriptors have the same length; the
    /// matcher skips mismatched candidates before comparing.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        debug_assert_eq!(self.0.len(), other.0.len());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Parse the JSON-array interchange form.
    pub fn from_json(s: &str) -> Result<Self, DescriptorError> {
        let values: Vec<f32> = serde_json::from_str(s)?;
        Self::new(values)
    }

    /// Serialize to the JSON-array interchange form.
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Encode as a little-endian f32 blob (the storage format).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode a little-endian f32 blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        if bytes.len() % 4 != 0 {
            return Err(DescriptorError::TruncatedBlob(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.0
    }
}
