use std::collections::{BTreeMap, BTreeSet};

use crate::files::OwnedFile;

type Key = (String, String);

/// All blobs of one kind, keyed by `(owner, name)`.
///
/// Mutations are tracked so that only changed blobs are written back and
/// removed blobs are deleted from disk.
#[derive(Debug, Clone)]
pub struct FileTable<F: OwnedFile> {
    files: BTreeMap<String, BTreeMap<String, F>>,
    dirty: BTreeSet<Key>,
    removed: BTreeSet<Key>,
}

impl<F: OwnedFile> Default for FileTable<F> {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<F: OwnedFile> FileTable<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a blob.
    pub fn insert(&mut self, file: F) {
        let key = (file.owner().to_string(), file.name().to_string());
        self.removed.remove(&key);
        self.dirty.insert(key.clone());
        self.files.entry(key.0).or_default().insert(key.1, file);
    }

    pub fn get(&self, owner: &str, name: &str) -> Option<&F> {
        self.files.get(owner).and_then(|m| m.get(name))
    }

    pub fn contains(&self, owner: &str, name: &str) -> bool {
        self.get(owner, name).is_some()
    }

    /// Replace a blob with an updated copy. Returns false when absent.
    pub fn update<U: FnOnce(&mut F)>(&mut self, owner: &str, name: &str, update: U) -> bool {
        let Some(file) = self.files.get_mut(owner).and_then(|m| m.get_mut(name)) else {
            return false;
        };
        update(file);
        self.dirty.insert((owner.to_string(), name.to_string()));
        true
    }

    pub fn remove(&mut self, owner: &str, name: &str) -> Option<F> {
        let per_owner = self.files.get_mut(owner)?;
        let file = per_owner.remove(name)?;
        if per_owner.is_empty() {
            self.files.remove(owner);
        }
        let key = (owner.to_string(), name.to_string());
        self.dirty.remove(&key);
        self.removed.insert(key);
        Some(file)
    }

    /// Every blob of one owner, sorted by name.
    pub fn list(&self, owner: &str) -> Vec<&F> {
        self.files
            .get(owner)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn names(&self, owner: &str) -> Vec<String> {
        self.files
            .get(owner)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn owners(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &F> {
        self.files.values().flat_map(|m| m.values())
    }

    pub fn len(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keys written or removed since the last call, in that order.
    pub(crate) fn take_changes(&mut self) -> (Vec<Key>, Vec<Key>) {
        let dirty = std::mem::take(&mut self.dirty).into_iter().collect();
        let removed = std::mem::take(&mut self.removed).into_iter().collect();
        (dirty, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::ActorArchiveFile;

    fn archive(owner: &str, name: &str) -> ActorArchiveFile {
        ActorArchiveFile {
            owner: owner.into(),
            name: name.into(),
            appearance: String::new(),
        }
    }

    #[test]
    fn insert_list_and_remove() {
        let mut table = FileTable::new();
        table.insert(archive("A", "C"));
        table.insert(archive("A", "B"));
        table.insert(archive("B", "A"));

        assert_eq!(table.len(), 3);
        assert_eq!(table.names("A"), vec!["B", "C"]);
        assert!(table.contains("B", "A"));

        assert!(table.remove("B", "A").is_some());
        assert!(table.remove("B", "A").is_none());
        assert_eq!(table.owners(), vec!["A"]);
    }

    #[test]
    fn changes_track_dirty_and_removed() {
        let mut table = FileTable::new();
        table.insert(archive("A", "B"));
        table.insert(archive("A", "C"));
        let _ = table.take_changes();

        assert!(table.update("A", "B", |f| f.appearance = "tall".into()));
        table.remove("A", "C");
        let (dirty, removed) = table.take_changes();
        assert_eq!(dirty, vec![("A".to_string(), "B".to_string())]);
        assert_eq!(removed, vec![("A".to_string(), "C".to_string())]);

        let (dirty, removed) = table.take_changes();
        assert!(dirty.is_empty() && removed.is_empty());
    }

    #[test]
    fn update_missing_returns_false() {
        let mut table: FileTable<ActorArchiveFile> = FileTable::new();
        assert!(!table.update("A", "B", |_| {}));
    }
}
