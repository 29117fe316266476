//! Versioned on-disk model artifact.
//!
//! Layout: 8-byte magic, little-endian `u32` format version, then the
//! bincode-encoded [`ModelArtifact`]. The decoded value is validated before
//! anything is built from it; the similarity index itself is not stored
//! and is rebuilt from the catalog vectors on load.

use crate::error::ModelError;
use crate::feature_space::NormalizationTransform;
use crate::song::SongRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const MAGIC: &[u8; 8] = b"MUSREC\0\0";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub transform: NormalizationTransform,
    pub catalog: Vec<SongRecord>,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, self)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ModelError::BadMagic);
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let artifact: Self = bincode::deserialize(&bytes[HEADER_LEN..])?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check the invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ModelError> {
        let dim = self.feature_names.len();
        if dim == 0 {
            return Err(ModelError::Invalid("no feature dimensions".into()));
        }
        let mut seen = HashSet::with_capacity(dim);
        if let Some(dup) = self.feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(ModelError::Invalid(format!("duplicate feature '{dup}'")));
        }
        if self.transform.means.len() != dim || self.transform.scales.len() != dim {
            return Err(ModelError::Invalid(format!(
                "transform has {} means and {} scales for {dim} features",
                self.transform.means.len(),
                self.transform.scales.len()
            )));
        }
        if self.transform.means.iter().any(|m| !m.is_finite()) {
            return Err(ModelError::Invalid("non-finite transform mean".into()));
        }
        if self
            .transform
            .scales
            .iter()
            .any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(ModelError::Invalid("zero or non-finite transform scale".into()));
        }

        if self.catalog.is_empty() {
            return Err(ModelError::EmptyCatalog);
        }
        for (row, song) in self.catalog.iter().enumerate() {
            if song.feature_vector.len() != dim {
                return Err(ModelError::DimensionMismatch {
                    row,
                    expected: dim,
                    found: song.feature_vector.len(),
                });
            }
            if song.feature_vector.iter().any(|x| !x.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "row {row} has a non-finite value"
                )));
            }
        }
        Ok(())
    }
}
