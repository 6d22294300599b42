use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{debug, warn};

use crate::canonical_key;

/// Reading state of one document as it is written to disk. Every field is
/// optional so that a stored `false` or `0` can be told apart from a missing
/// entry when merging onto a freshly opened document.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedDocumentState {
    #[serde(alias = "invert")]
    pub inverted: Option<bool>,
    #[serde(alias = "splits")]
    pub split_count: Option<usize>,
    #[serde(alias = "virtual_page")]
    pub page_index: Option<usize>,
    pub page_number_delta: Option<i64>,
    pub marks: Option<HashMap<char, usize>>,
    pub blank_pages: Option<BTreeSet<usize>>,
}

pub trait StateStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Option<PersistedDocumentState>>;
    fn save(&self, path: &Path, state: &PersistedDocumentState) -> Result<()>;
}

/// All documents share one JSON file mapping canonical paths to their state.
pub struct FileStateStore {
    file: PathBuf,
}

impl FileStateStore {
    pub fn new(file: PathBuf) -> Result<Self> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state directory at {:?}", parent))?;
        }
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn read_entries(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let buf = match fs::read_to_string(&self.file) {
            Ok(buf) => buf,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {:?}", self.file))
            }
        };
        if buf.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&buf).with_context(|| format!("failed to decode {:?}", self.file))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, path: &Path) -> Result<Option<PersistedDocumentState>> {
        let key = canonical_key(path);
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?err, "ignoring unreadable state file");
                return Ok(None);
            }
        };
        let Some(value) = entries.remove(&key) else {
            debug!(%key, "no stored state");
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(?err, %key, "ignoring malformed state entry");
                Ok(None)
            }
        }
    }

    fn save(&self, path: &Path, state: &PersistedDocumentState) -> Result<()> {
        let key = canonical_key(path);
        let mut entries = self.read_entries().unwrap_or_else(|err| {
            warn!(?err, "state file unreadable, rewriting from scratch");
            BTreeMap::new()
        });
        entries.insert(key, serde_json::to_value(state)?);

        let tmp = self.file.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(&entries)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &self.file)
            .with_context(|| format!("failed to replace state file {:?}", self.file))?;
        Ok(())
    }
}

pub struct MemoryStateStore {
    inner: Mutex<HashMap<String, PersistedDocumentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, path: &Path) -> Result<Option<PersistedDocumentState>> {
        Ok(self.inner.lock().get(&canonical_key(path)).cloned())
    }

    fn save(&self, path: &Path, state: &PersistedDocumentState) -> Result<()> {
        self.inner.lock().insert(canonical_key(path), state.clone());
        Ok(())
    }
}
