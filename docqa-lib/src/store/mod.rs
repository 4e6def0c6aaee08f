//! Document storage
//!
//! The store owns every [`TextUnit`]. Queries never read the live store:
//! they take a [`Snapshot`] first, which stays unchanged while later writes
//! go ahead.
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::store::{DocumentStore, MemoryStore};
//!
//! let mut store = MemoryStore::new();
//! store.insert(unit)?;
//!
//! let snapshot = store.snapshot();
//! for unit in snapshot.iter() {
//!     // ...
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunk::TextUnit;
use crate::embed::Embedding;
use crate::Result;

/// Trait for document storage backends
pub trait DocumentStore: Send + Sync {
    /// Insert a unit
    ///
    /// Fails with [`Error::AlreadyIndexed`](crate::Error::AlreadyIndexed) if
    /// a unit with the same id is present.
    fn insert(&mut self, unit: TextUnit) -> Result<()>;

    /// Look up a unit by id
    fn get(&self, id: &str) -> Option<TextUnit>;

    /// All units in insertion order
    fn get_all(&self) -> Vec<TextUnit>;

    /// Immutable view of the current contents
    fn snapshot(&self) -> Snapshot;

    /// Attach an embedding to an existing unit
    fn set_embedding(&mut self, id: &str, embedding: Embedding) -> Result<()>;

    /// Get total number of stored units
    fn len(&self) -> usize;

    /// Check if store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all stored units
    fn clear(&mut self);
}

/// Units in insertion order plus an id lookup table.
#[derive(Debug, Clone, Default)]
pub(crate) struct Contents {
    units: Vec<TextUnit>,
    positions: HashMap<String, usize>,
}

impl Contents {
    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub(crate) fn push(&mut self, unit: TextUnit) {
        self.positions.insert(unit.id.clone(), self.units.len());
        self.units.push(unit);
    }

    pub(crate) fn unit_mut(&mut self, id: &str) -> Option<&mut TextUnit> {
        let position = self.position(id)?;
        self.units.get_mut(position)
    }
}

/// A read-only, cheaply clonable view of a store at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    contents: Arc<Contents>,
}

impl Snapshot {
    pub(crate) fn new(contents: Arc<Contents>) -> Self {
        Self { contents }
    }

    /// Look up a unit by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TextUnit> {
        let position = self.contents.position(id)?;
        self.contents.units.get(position)
    }

    /// Iterate units in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TextUnit> {
        self.contents.units.iter()
    }

    /// Units in insertion order
    #[must_use]
    pub fn units(&self) -> &[TextUnit] {
        &self.contents.units
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.units.is_empty()
    }

    /// Number of units without an embedding
    #[must_use]
    pub fn missing_embeddings(&self) -> usize {
        self.iter().filter(|u| u.embedding.is_none()).count()
    }
}

mod memory;

pub use memory::*;
