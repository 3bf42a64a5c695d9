// src/fs/mock.rs

use super::{FileSystem, FsFuture};
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem for tests.
///
/// Paths registered with [`MockFileSystem::fail_under`] reject every
/// operation, which is how tests provoke handler errors.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `path` or below it fail.
    pub fn fail_under(&self, path: impl AsRef<Path>) {
        let mut failing = self.failing.lock().unwrap();
        failing.insert(path.as_ref().to_path_buf());
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        let entries = self.entries.lock().unwrap();
        matches!(entries.get(path.as_ref()), Some(MockEntry::Dir))
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn check_allowed(&self, path: &Path) -> Result<()> {
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|p| path.starts_with(p)) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        Ok(())
    }

    fn mkdirs(&self, path: &Path) -> Result<()> {
        self.check_allowed(path)?;
        let mut entries = self.entries.lock().unwrap();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match entries.get(ancestor) {
                Some(MockEntry::File(_)) => {
                    return Err(anyhow!("Not a directory: {:?}", ancestor));
                }
                Some(MockEntry::Dir) => {}
                None => {
                    entries.insert(ancestor.to_path_buf(), MockEntry::Dir);
                }
            }
        }
        Ok(())
    }

    fn append(&self, path: &Path, line: &[u8]) -> Result<()> {
        self.check_allowed(path)?;
        let mut entries = self.entries.lock().unwrap();

        let parent_ok = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                matches!(entries.get(parent), Some(MockEntry::Dir))
            }
            _ => true,
        };
        if !parent_ok {
            return Err(anyhow!("No such directory for {:?}", path));
        }

        match entries
            .entry(path.to_path_buf())
            .or_insert_with(|| MockEntry::File(Vec::new()))
        {
            MockEntry::File(content) => {
                content.extend_from_slice(line);
                content.push(b'\n');
                Ok(())
            }
            MockEntry::Dir => Err(anyhow!("Is a directory: {:?}", path)),
        }
    }

    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.mkdirs(parent)?;
            }
        }
        self.check_allowed(path)?;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(())
    }
}

impl FileSystem for MockFileSystem {
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()> {
        Box::pin(async move { self.mkdirs(path) })
    }

    fn append_line<'a>(&'a self, path: &'a Path, line: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(async move { self.append(path, line) })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(async move { self.replace(path, contents) })
    }
}
