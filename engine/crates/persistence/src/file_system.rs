use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PersistenceError;
use crate::files::{
    ActorArchiveFile, OwnedFile, PropFile, StageActorsMap, StageArchiveFile, StatusProfile,
};
use crate::io::{remove_if_exists, write_json_atomic};
use crate::table::FileTable;

/// Result of a prop transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub prop_name: String,
    pub moved: u32,
    /// Count left with the source (0 means the source blob was removed).
    pub source_left: u32,
    pub destination_total: u32,
}

/// Counts of what a flush wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub removed: usize,
    pub bytes: usize,
}

/// In-memory blob store with optional write-through to a runtime directory.
///
/// The store is owned by the round runner; nothing else touches it while a
/// batch of agent requests is in flight.
#[derive(Debug, Default)]
pub struct FileSystem {
    runtime_dir: Option<PathBuf>,
    pub props: FileTable<PropFile>,
    pub actor_archives: FileTable<ActorArchiveFile>,
    pub stage_archives: FileTable<StageArchiveFile>,
    pub status_profiles: FileTable<StatusProfile>,
    stage_actors_map: StageActorsMap,
    stage_actors_map_dirty: bool,
}

impl FileSystem {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_runtime_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn runtime_dir(&self) -> Option<&Path> {
        self.runtime_dir.as_deref()
    }

    pub fn stage_actors_map(&self) -> &StageActorsMap {
        &self.stage_actors_map
    }

    pub fn set_stage_actors_map(&mut self, map: StageActorsMap) {
        if map != self.stage_actors_map {
            self.stage_actors_map = map;
            self.stage_actors_map_dirty = true;
        }
    }

    pub fn prop(&self, owner: &str, name: &str) -> Option<&PropFile> {
        self.props.get(owner, name)
    }

    /// Credit `count` of a prop to `owner`, merging with an existing stack.
    pub fn give_prop(&mut self, owner: &str, file: PropFile) {
        let name = file.prop.name.clone();
        let count = file.count;
        if !self.props.update(owner, &name, |existing| existing.count += count) {
            self.props.insert(PropFile {
                owner: owner.to_string(),
                ..file
            });
        }
    }

    /// Move `count` of prop `name` from `from` to `to`; `None` moves the
    /// whole stack. A full move deletes the source blob.
    pub fn transfer_prop(
        &mut self,
        from: &str,
        to: &str,
        name: &str,
        count: Option<u32>,
    ) -> Result<TransferReceipt, PersistenceError> {
        if from == to {
            return Err(PersistenceError::SameOwner(from.to_string()));
        }
        let source = self.props.get(from, name).ok_or_else(|| PersistenceError::NotFound {
            kind: "prop",
            owner: from.to_string(),
            name: name.to_string(),
        })?;

        let have = source.count;
        let want = count.unwrap_or(have);
        if want == 0 {
            return Err(PersistenceError::ZeroCount(name.to_string()));
        }
        if want > have {
            return Err(PersistenceError::InsufficientCount {
                owner: from.to_string(),
                name: name.to_string(),
                have,
                want,
            });
        }
        if source.is_unique() && want != have {
            return Err(PersistenceError::UniqueSplit {
                name: name.to_string(),
                have,
                want,
            });
        }

        let moved = if want == have {
            self.props.remove(from, name).ok_or_else(|| PersistenceError::NotFound {
                kind: "prop",
                owner: from.to_string(),
                name: name.to_string(),
            })?
        } else {
            let mut part = source.clone();
            part.count = want;
            self.props.update(from, name, |f| f.count -= want);
            part
        };
        self.give_prop(to, PropFile { count: want, ..moved });

        let receipt = TransferReceipt {
            prop_name: name.to_string(),
            moved: want,
            source_left: have - want,
            destination_total: self.props.get(to, name).map(|f| f.count).unwrap_or(0),
        };
        tracing::debug!(from, to, prop = name, moved = want, "prop transferred");
        Ok(receipt)
    }

    /// Sum of `count` over every owner of a prop.
    pub fn total_count(&self, name: &str) -> u32 {
        self.props
            .iter()
            .filter(|f| f.prop.name == name)
            .map(|f| f.count)
            .sum()
    }

    /// Write every changed blob and delete removed ones. A store without a
    /// runtime directory just forgets its change sets.
    pub fn flush(&mut self) -> Result<FlushReport, PersistenceError> {
        let mut report = FlushReport::default();
        let Some(root) = self.runtime_dir.clone() else {
            let _ = self.props.take_changes();
            let _ = self.actor_archives.take_changes();
            let _ = self.stage_archives.take_changes();
            let _ = self.status_profiles.take_changes();
            self.stage_actors_map_dirty = false;
            return Ok(report);
        };

        flush_table(&root, &mut self.props, &mut report)?;
        flush_table(&root, &mut self.actor_archives, &mut report)?;
        flush_table(&root, &mut self.stage_archives, &mut report)?;
        flush_table(&root, &mut self.status_profiles, &mut report)?;

        if self.stage_actors_map_dirty {
            report.bytes += write_json_atomic(&root.join("stage_actors_map.json"), &self.stage_actors_map)?;
            report.written += 1;
            self.stage_actors_map_dirty = false;
        }

        if report.written > 0 || report.removed > 0 {
            tracing::info!(
                written = report.written,
                removed = report.removed,
                bytes = report.bytes,
                path = %root.display(),
                "file system flushed"
            );
        }
        Ok(report)
    }

    /// Write an arbitrary per-owner JSON document, e.g. a chat history dump.
    pub fn write_owner_json<T: Serialize + ?Sized>(
        &self,
        owner: &str,
        file_name: &str,
        value: &T,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(root) = &self.runtime_dir else {
            return Ok(None);
        };
        let path = root.join(owner).join(file_name);
        write_json_atomic(&path, value)?;
        Ok(Some(path))
    }
}

fn flush_table<F: OwnedFile>(
    root: &Path,
    table: &mut FileTable<F>,
    report: &mut FlushReport,
) -> Result<(), PersistenceError> {
    let (dirty, removed) = table.take_changes();
    for (owner, name) in dirty {
        if let Some(file) = table.get(&owner, &name) {
            report.bytes += write_json_atomic(&root.join(F::KIND.relative_path(&owner, &name)), file)?;
            report.written += 1;
        }
    }
    for (owner, name) in removed {
        if remove_if_exists(&root.join(F::KIND.relative_path(&owner, &name)))? {
            report.removed += 1;
        }
    }
    Ok(())
}
