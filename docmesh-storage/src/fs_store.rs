use crate::config::StorageConfig;
use docmesh_repo::{CrdtEngine, Document, RepoError, RepoResult, StorageAdapter};
use docmesh_types::DocumentId;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Stores documents as files in a directory.
///
/// Clones share one write lock. Every save or compaction holds it from the
/// moment the engine hands out bytes until they are on disk, so an append
/// never lands on a file that a compaction is about to replace.
#[derive(Debug, Clone)]
pub struct FsStore {
    config: StorageConfig,
    write_lock: Arc<Mutex<()>>,
}

impl FsStore {
    /// Creates a store over `dir` with the default extension.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_config(StorageConfig::new(dir))
    }

    pub fn with_config(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Arc::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Path of the file holding `id`.
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.config
            .dir
            .join(format!("{id}.{}", self.config.extension))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot<E: CrdtEngine>(&self, doc: &Document<E>) -> RepoResult<()> {
        let path = self.path_for(&doc.id());
        let data = doc.save();
        self.write_snapshot(&path, &data)?;
        debug!(document = %doc.id(), bytes = data.len(), "wrote snapshot");
        Ok(())
    }

    fn write_snapshot(&self, path: &Path, data: &[u8]) -> RepoResult<()> {
        fs::create_dir_all(&self.config.dir)?;
        let tmp = path.with_extension(format!("{}.tmp", self.config.extension));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<E: CrdtEngine> StorageAdapter<E> for FsStore {
    fn load(&self, id: &DocumentId) -> RepoResult<Document<E>> {
        let path = self.path_for(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(RepoError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        trace!(document = %id, bytes = data.len(), "read document file");
        Document::load(*id, &data)
    }

    fn save(&self, doc: &Document<E>) -> RepoResult<()> {
        let _guard = self.lock_writes();
        let path = self.path_for(&doc.id());
        if !path.exists() {
            return self.snapshot(doc);
        }
        let data = doc.save_incremental();
        if data.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(&data)?;
        debug!(document = %doc.id(), bytes = data.len(), "appended changes");
        Ok(())
    }

    fn compact(&self, doc: &Document<E>) -> RepoResult<()> {
        let _guard = self.lock_writes();
        self.snapshot(doc)
    }

    fn list(&self) -> RepoResult<Vec<DocumentId>> {
        let entries = match fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.config.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(id) = DocumentId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
