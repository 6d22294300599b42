use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::Document;

/// Runs against every document right after it has been opened, whether it was
/// the initial document or one reached through the directory chain.
pub trait OpenHook: Send + Sync {
    fn on_open(&self, document: &mut Document);
}

impl<F> OpenHook for F
where
    F: Fn(&mut Document) + Send + Sync,
{
    fn on_open(&self, document: &mut Document) {
        self(document)
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to read hook file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid hook file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("split_count {0} in hook file is outside 1..=10")]
    SplitCount(usize),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HookFile {
    on_open: Option<OpenSettings>,
}

/// Declarative `[on_open]` table of the per-user `hooks.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenSettings {
    pub split_count: Option<usize>,
    pub inverted: Option<bool>,
    pub first_blank: Option<bool>,
    #[serde(default = "default_fresh_only")]
    pub fresh_only: bool,
}

fn default_fresh_only() -> bool {
    true
}

impl OpenSettings {
    /// Reads the hook file; a missing file registers no hook.
    pub fn load(path: &Path) -> Result<Option<Self>, HookError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no hook file");
                return Ok(None);
            }
            Err(source) => {
                return Err(HookError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&raw).map_err(|err| match err {
            HookError::Parse { source, .. } => HookError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Option<Self>, HookError> {
        let file: HookFile = toml::from_str(raw).map_err(|source| HookError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        if let Some(settings) = &file.on_open {
            if let Some(split) = settings.split_count {
                if !(1..=crate::MAX_SPLIT_COUNT).contains(&split) {
                    return Err(HookError::SplitCount(split));
                }
            }
        }
        Ok(file.on_open)
    }
}

impl OpenHook for OpenSettings {
    fn on_open(&self, document: &mut Document) {
        if self.fresh_only && document.restored() {
            return;
        }
        if let Some(split) = self.split_count {
            document.set_split_count(split);
        }
        if let Some(inverted) = self.inverted {
            if document.inverted() != inverted {
                document.invert();
            }
        }
        if let Some(first_blank) = self.first_blank {
            if document.pages().is_blank(0) != first_blank {
                document.toggle_first_blank();
            }
        }
    }
}
