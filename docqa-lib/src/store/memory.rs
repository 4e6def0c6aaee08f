use std::sync::Arc;

use crate::chunk::TextUnit;
use crate::embed::Embedding;
use crate::store::{Contents, DocumentStore, Snapshot};
use crate::{Error, Result};

/// In-memory document store.
///
/// Contents sit behind an `Arc` and are copied on the first write after a
/// snapshot was taken, so outstanding snapshots never observe a mutation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Arc<Contents>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&mut self, unit: TextUnit) -> Result<()> {
        if self.contents.position(&unit.id).is_some() {
            return Err(Error::AlreadyIndexed(unit.id));
        }
        Arc::make_mut(&mut self.contents).push(unit);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<TextUnit> {
        self.snapshot().get(id).cloned()
    }

    fn get_all(&self) -> Vec<TextUnit> {
        self.snapshot().units().to_vec()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.contents))
    }

    fn set_embedding(&mut self, id: &str, embedding: Embedding) -> Result<()> {
        if self.contents.position(id).is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        if let Some(unit) = Arc::make_mut(&mut self.contents).unit_mut(id) {
            unit.embedding = Some(embedding);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn clear(&mut self) {
        self.contents = Arc::new(Contents::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UnitMetadata;

    fn make_unit(content: &str) -> TextUnit {
        TextUnit::new(content, UnitMetadata::default())
    }

    #[test]
    fn test_insert_and_len() {
        let mut store = MemoryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());

        store.insert(make_unit("hello")).unwrap();
        store.insert(make_unit("world")).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = MemoryStore::new();
        store.insert(make_unit("same content")).unwrap();

        let err = store.insert(make_unit("same content")).unwrap_err();
        assert!(matches!(err, Error::AlreadyIndexed(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_all_keeps_insertion_order() {
        let mut store = MemoryStore::new();
        for text in ["zulu", "alpha", "mike"] {
            store.insert(make_unit(text)).unwrap();
        }

        let contents: Vec<String> = store.get_all().into_iter().map(|u| u.content).collect();
        assert_eq!(contents, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_get_by_id() {
        let mut store = MemoryStore::new();
        let unit = make_unit("findable");
        let id = unit.id.clone();
        store.insert(unit).unwrap();

        assert_eq!(store.get(&id).unwrap().content, "findable");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let mut store = MemoryStore::new();
        let first = make_unit("first");
        let first_id = first.id.clone();
        store.insert(first).unwrap();

        let snapshot = store.snapshot();
        store.insert(make_unit("second")).unwrap();
        store.set_embedding(&first_id, vec![1.0, 0.0]).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(&first_id).unwrap().embedding.is_none());
        assert_eq!(store.len(), 2);
        assert!(store.get(&first_id).unwrap().embedding.is_some());
    }

    #[test]
    fn test_set_embedding_unknown_id() {
        let mut store = MemoryStore::new();
        let err = store.set_embedding("nope", vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_missing_embeddings_count() {
        let mut store = MemoryStore::new();
        let a = make_unit("a");
        let a_id = a.id.clone();
        store.insert(a).unwrap();
        store.insert(make_unit("b")).unwrap();
        store.set_embedding(&a_id, vec![0.5]).unwrap();

        assert_eq!(store.snapshot().missing_embeddings(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryStore::new();
        store.insert(make_unit("hello")).unwrap();
        let snapshot = store.snapshot();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
