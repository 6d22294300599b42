use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

pub mod chain;
pub mod command;
pub mod document;
pub mod hooks;
pub mod layout;
pub mod page_map;
pub mod session;
pub mod store;

pub use chain::DirectoryChain;
pub use command::{Command, CommandInterpreter, Feed, InputState, Symbol};
pub use document::{Document, ReadStamp, ReadingSession, MAX_SPLIT_COUNT};
pub use hooks::{HookError, OpenHook, OpenSettings};
pub use layout::{compose_spread, SpreadLayout, SpreadSlot};
pub use page_map::PageMap;
pub use session::{Outcome, Session, StartPosition};
pub use store::{FileStateStore, MemoryStateStore, PersistedDocumentState, StateStore};

/// Resolves the key a document's state is stored under: the canonical absolute
/// path, or the best absolute form available when the file cannot be resolved.
pub fn canonical_key(path: &Path) -> String {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    resolved.to_string_lossy().into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Asks the backend for one underlying page at `scale` device pixels per page unit.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }
}

/// A rendered document as seen by the core: an ordered sequence of pages with
/// natural sizes, each of which can be rasterised on request.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    /// Natural `(width, height)` of an underlying page, in page units.
    fn page_size(&self, page_index: usize) -> Result<(f32, f32)>;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
