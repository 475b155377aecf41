//! Feature storage abstraction.
//!
//! Both the feature store and the extraction result map keep features in a
//! [`FeatureBackend`]. The in-memory backend is the default; the disk backend
//! spills feature bodies to an anonymous temp file for datasets that do not
//! fit in memory. Behaviour is identical between the two: ordered by ID,
//! last insert wins.

use crate::error::Result;
use crate::feature::{Feature, FeatureId};
use serde::{Deserialize, Serialize};

mod disk;
mod memory;

pub use disk::DiskFeatureBackend;
pub use memory::MemoryFeatureBackend;

/// Keyed feature storage, ordered by ID.
///
/// `insert` overwrites silently; uniqueness rules belong to the caller.
pub trait FeatureBackend: Send {
    /// Insert or replace a feature
    fn insert(&mut self, feature: Feature) -> Result<()>;

    /// Get an owned copy of a feature
    fn get(&self, id: FeatureId) -> Result<Option<Feature>>;

    /// Check if an ID is present
    fn contains(&self, id: FeatureId) -> bool;

    /// Number of stored features
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// IDs in ascending order
    fn ids(&self) -> Box<dyn Iterator<Item = FeatureId> + '_>;

    /// Features in ascending ID order
    fn values(&self) -> Box<dyn Iterator<Item = Result<Feature>> + '_>;
}

impl<B: FeatureBackend + ?Sized> FeatureBackend for Box<B> {
    fn insert(&mut self, feature: Feature) -> Result<()> {
        (**self).insert(feature)
    }

    fn get(&self, id: FeatureId) -> Result<Option<Feature>> {
        (**self).get(id)
    }

    fn contains(&self, id: FeatureId) -> bool {
        (**self).contains(id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn ids(&self) -> Box<dyn Iterator<Item = FeatureId> + '_> {
        (**self).ids()
    }

    fn values(&self) -> Box<dyn Iterator<Item = Result<Feature>> + '_> {
        (**self).values()
    }
}

/// Which backend to use for a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Memory,
    /// Temp-file backed; deleted when dropped
    Disk,
}

impl StorageKind {
    pub fn create(self) -> Result<Box<dyn FeatureBackend>> {
        Ok(match self {
            StorageKind::Memory => Box::new(MemoryFeatureBackend::new()),
            StorageKind::Disk => Box::new(DiskFeatureBackend::new()?),
        })
    }
}
