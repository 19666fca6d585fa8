use std::path::PathBuf;

/// Default file extension for stored documents.
pub const DEFAULT_EXTENSION: &str = "automerge";

/// Configuration for [`FsStore`](crate::FsStore).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one file per document. Created on first write.
    pub dir: PathBuf,
    /// Extension of document files, without the leading dot.
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("docmesh-data"),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}
