//! Durable storage for the client's queue and cache documents.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{ClientError, Result};

/// Key/value store of JSON documents. `save` must be durable on return.
pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, contents: &str) -> Result<()>;
}

/// One `<key>.json` file per document inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, contents: &str) -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(self.path(key))
            .map_err(|err| ClientError::Io(err.error))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| ClientError::Store("memory store poisoned".to_string()))?;
        Ok(documents.get(key).cloned())
    }

    fn save(&self, key: &str, contents: &str) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| ClientError::Store("memory store poisoned".to_string()))?;
        documents.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Loads a document written with schema `current`.
///
/// Newer documents are refused; older ones are dropped with a warning and
/// the caller starts from an empty state.
pub(crate) fn load_versioned<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
    current: u32,
) -> Result<Option<T>> {
    let Some(raw) = store.load(key)? else {
        return Ok(None);
    };
    let header: VersionHeader = serde_json::from_str(&raw)?;
    if header.version > current {
        return Err(ClientError::UnsupportedVersion {
            document: key.to_string(),
            found: header.version,
            supported: current,
        });
    }
    if header.version < current {
        tracing::warn!(
            document = key,
            found = header.version,
            current,
            "discarding outdated client state"
        );
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

pub(crate) fn save_versioned<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    document: &T,
) -> Result<()> {
    let raw = serde_json::to_string_pretty(document)?;
    store.save(key, &raw)
}
