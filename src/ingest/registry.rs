//! Lookup table of the source files the host tracks in this pass.

use std::collections::HashMap;
use tracing::debug;

use crate::traits::{SourceFiles, TrackedFile};

/// Normalized path → host handle, rebuilt for every analysis pass.
#[derive(Debug, Clone)]
pub struct FileRegistry<H> {
    files: HashMap<String, H>,
}

impl<H> Default for FileRegistry<H> {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
        }
    }
}

impl<H> FileRegistry<H> {
    /// Enumerates every file the host recognizes for `language`.
    pub fn from_host<S>(host: &S, language: &str) -> Self
    where
        S: SourceFiles<Handle = H> + ?Sized,
    {
        let registry = Self::from_files(host.source_files(language));
        debug!(language, files = registry.len(), "Built file registry");
        registry
    }

    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = TrackedFile<H>>,
    {
        let files = files
            .into_iter()
            .map(|file| (normalize_path(&file.path), file.handle))
            .collect();
        Self { files }
    }

    pub fn insert(&mut self, path: &str, handle: H) {
        self.files.insert(normalize_path(path), handle);
    }

    /// Handle for `path`, if the host tracks that file.
    pub fn get(&self, path: &str) -> Option<&H> {
        self.files.get(&normalize_path(path))
    }

    /// Normalized key and handle for `path`; aliases of one file share a key.
    pub fn lookup(&self, path: &str) -> Option<(&str, &H)> {
        self.files
            .get_key_value(&normalize_path(path))
            .map(|(key, handle)| (key.as_str(), handle))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Canonical key form: forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}
