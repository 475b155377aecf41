//! In-memory feature backend.

use super::FeatureBackend;
use crate::error::Result;
use crate::feature::{Feature, FeatureId};
use std::collections::BTreeMap;

/// In-memory storage backend using BTreeMap
#[derive(Debug, Default, Clone)]
pub struct MemoryFeatureBackend {
    data: BTreeMap<FeatureId, Feature>,
}

impl MemoryFeatureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the backend, yielding features in ID order.
    pub fn into_inner(self) -> BTreeMap<FeatureId, Feature> {
        self.data
    }
}

impl FeatureBackend for MemoryFeatureBackend {
    fn insert(&mut self, feature: Feature) -> Result<()> {
        self.data.insert(feature.id, feature);
        Ok(())
    }

    fn get(&self, id: FeatureId) -> Result<Option<Feature>> {
        Ok(self.data.get(&id).cloned())
    }

    fn contains(&self, id: FeatureId) -> bool {
        self.data.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn ids(&self) -> Box<dyn Iterator<Item = FeatureId> + '_> {
        Box::new(self.data.keys().copied())
    }

    fn values(&self) -> Box<dyn Iterator<Item = Result<Feature>> + '_> {
        Box::new(self.data.values().cloned().map(Ok))
    }
}
