use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::command::{Command, CommandInterpreter, Feed, Symbol};
use crate::{DirectoryChain, Document, DocumentProvider, OpenHook, StateStore};

/// Where a freshly opened document is positioned after its stored state loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Stored,
    First,
    LastSpread,
}

impl StartPosition {
    fn apply(self, document: &mut Document) {
        match self {
            StartPosition::Stored => {}
            StartPosition::First => {
                document.set_page_index(0);
            }
            StartPosition::LastSpread => {
                document.set_page_number(last_spread_page_number(document));
            }
        }
    }
}

/// Page number that shows the final spread, counted from the end.
fn last_spread_page_number(document: &Document) -> i64 {
    -(document.split_count() as i64) + 1
}

/// First page number of the spread-aligned position at or after `page`, or
/// `None` when that position is not representable.
fn aligned_page_number(page: usize, split_count: usize) -> Option<usize> {
    let split = split_count.max(1);
    let offset = page.saturating_sub(1);
    offset.div_ceil(split).checked_mul(split)?.checked_add(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Input was consumed towards a longer sequence; refresh the status line.
    Pending,
    Ignored,
    Redraw,
    Quit,
}

/// Owns the document being read and everything needed to replace it.
pub struct Session {
    document: Document,
    provider: Arc<dyn DocumentProvider>,
    store: Arc<dyn StateStore>,
    chain: DirectoryChain,
    hooks: Vec<Box<dyn OpenHook>>,
    interpreter: CommandInterpreter,
    closed: bool,
}

impl Session {
    #[instrument(skip(provider, store, chain, hooks))]
    pub async fn open(
        provider: Arc<dyn DocumentProvider>,
        store: Arc<dyn StateStore>,
        chain: DirectoryChain,
        hooks: Vec<Box<dyn OpenHook>>,
        path: PathBuf,
    ) -> Result<Self> {
        let document = open_document(
            provider.as_ref(),
            store.as_ref(),
            &hooks,
            &path,
            StartPosition::Stored,
        )
        .await
        .with_context(|| format!("failed to open {:?}", path))?;
        Ok(Self {
            document,
            provider,
            store,
            chain,
            hooks,
            interpreter: CommandInterpreter::new(),
            closed: false,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn pending_input(&self) -> Option<String> {
        self.interpreter.pending_input()
    }

    pub async fn handle_symbol(&mut self, symbol: Symbol) -> Result<Outcome> {
        match self.interpreter.feed(symbol) {
            Feed::Pending => Ok(Outcome::Pending),
            Feed::Ignored => Ok(Outcome::Ignored),
            Feed::Execute(command) => {
                let outcome = self.apply(command).await?;
                if outcome != Outcome::Quit && self.interpreter.record_executed() {
                    self.persist_or_warn();
                }
                Ok(outcome)
            }
        }
    }

    pub async fn apply(&mut self, command: Command) -> Result<Outcome> {
        let doc = &mut self.document;
        match command {
            Command::NextSpread { count } => {
                let step = count.saturating_mul(doc.split_count());
                if !doc.forward_pages(step) {
                    self.follow_chain(ChainStep::Next).await;
                }
            }
            Command::PrevSpread { count } => {
                let step = count.saturating_mul(doc.split_count());
                if !doc.back_pages(step) {
                    self.follow_chain(ChainStep::Previous).await;
                }
            }
            Command::NextPage { count } => {
                doc.forward_pages(count);
            }
            Command::PrevPage { count } => {
                doc.back_pages(count);
            }
            Command::InsertBlankLeft => {
                doc.insert_blank_left();
            }
            Command::InsertBlankRight => {
                doc.insert_blank_right();
            }
            Command::ToggleFirstBlank => doc.toggle_first_blank(),
            Command::GotoSpread { page } => {
                let target = match page {
                    Some(page) => aligned_page_number(page, doc.split_count()),
                    None => Some(1),
                };
                if let Some(target) = target {
                    doc.go_to_page_number(target);
                }
            }
            Command::GotoPage { page } => {
                match page {
                    Some(page) => doc.go_to_page_number(page),
                    None => doc.set_page_number(last_spread_page_number(doc)),
                };
            }
            Command::Invert => doc.invert(),
            Command::Reload => {
                doc.load(self.store.as_ref());
            }
            Command::Save => self.persist_or_warn(),
            Command::SetSplit { count } => match count {
                Some(count) => {
                    doc.set_split_count(count);
                }
                None => doc.toggle_split(),
            },
            Command::Quit => {
                if let Err(err) = self.close() {
                    warn!(?err, "failed to save state on quit");
                }
                return Ok(Outcome::Quit);
            }
            Command::SetPageNumberDelta { printed } => {
                if let Ok(printed) = i64::try_from(printed) {
                    doc.set_page_number_delta_for(printed);
                }
            }
            Command::ClearPageNumberDelta => doc.clear_page_number_delta(),
            Command::GotoPrintedPage { printed } => {
                if let Ok(printed) = i64::try_from(printed) {
                    doc.set_real_page_number(printed);
                }
            }
            Command::PutMark { key } => doc.mark(key),
            Command::GotoMark { key } => {
                doc.jump(key);
            }
        }
        Ok(Outcome::Redraw)
    }

    pub fn persist(&self) -> Result<()> {
        self.document.save(self.store.as_ref())
    }

    fn persist_or_warn(&self) {
        if let Err(err) = self.persist() {
            warn!(?err, path = %self.document.info.path.display(), "failed to save state");
        }
    }

    /// Ends the reading session of the current document and saves it. Safe to
    /// call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.document.close(self.store.as_ref())
    }

    async fn follow_chain(&mut self, step: ChainStep) {
        let current = self.document.info.path.clone();
        let (target, position) = match step {
            ChainStep::Next => (self.chain.next(&current), StartPosition::First),
            ChainStep::Previous => (self.chain.previous(&current), StartPosition::LastSpread),
        };
        let Some(target) = target else {
            info!(path = %current.display(), "no sibling document to move to");
            self.persist_or_warn();
            return;
        };
        self.switch_to(&target, position).await;
    }

    async fn switch_to(&mut self, path: &Path, position: StartPosition) {
        if let Err(err) = self.document.close(self.store.as_ref()) {
            warn!(?err, path = %self.document.info.path.display(), "failed to save state");
        }
        match open_document(
            self.provider.as_ref(),
            self.store.as_ref(),
            &self.hooks,
            path,
            position,
        )
        .await
        {
            Ok(document) => {
                info!(
                    from = %self.document.info.path.display(),
                    to = %path.display(),
                    "switched document"
                );
                self.document = document;
            }
            Err(err) => {
                warn!(?err, path = %path.display(), "failed to open sibling document");
                self.document.begin_reading();
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ChainStep {
    Next,
    Previous,
}

async fn open_document(
    provider: &dyn DocumentProvider,
    store: &dyn StateStore,
    hooks: &[Box<dyn OpenHook>],
    path: &Path,
    position: StartPosition,
) -> Result<Document> {
    let backend = provider.open(path).await?;
    let mut document = Document::new(backend);
    if position == StartPosition::Stored {
        document.open(store);
    } else {
        document.load(store);
        position.apply(&mut document);
        document.begin_reading();
    }
    for hook in hooks {
        hook.on_open(&mut document);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStateStore;
    use crate::testing::FakeProvider;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryStateStore>,
        provider: Arc<FakeProvider>,
    }

    impl Fixture {
        fn new(documents: &[(&str, usize)]) -> Self {
            let dir = tempdir().unwrap();
            for (name, _) in documents {
                std::fs::write(dir.path().join(name), b"dummy").unwrap();
            }
            Self {
                dir,
                store: Arc::new(MemoryStateStore::new()),
                provider: Arc::new(FakeProvider {
                    page_counts: documents
                        .iter()
                        .map(|(name, pages)| (name.to_string(), *pages))
                        .collect(),
                }),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        async fn open_with_hooks(&self, name: &str, hooks: Vec<Box<dyn OpenHook>>) -> Session {
            Session::open(
                self.provider.clone(),
                self.store.clone(),
                DirectoryChain::default(),
                hooks,
                self.path(name),
            )
            .await
            .unwrap()
        }

        async fn open(&self, name: &str) -> Session {
            self.open_with_hooks(name, Vec::new()).await
        }
    }

    async fn press(session: &mut Session, keys: &str) -> Outcome {
        let mut last = Outcome::Ignored;
        for c in keys.chars() {
            last = session.handle_symbol(Symbol::Char(c)).await.unwrap();
        }
        last
    }

    fn file_name(session: &Session) -> String {
        session
            .document()
            .info
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn spread_navigation_moves_by_split_count() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        assert_eq!(press(&mut session, "j").await, Outcome::Redraw);
        assert_eq!(session.document().page_index(), 2);
        press(&mut session, "2j").await;
        assert_eq!(session.document().page_index(), 6);
        press(&mut session, "J").await;
        assert_eq!(session.document().page_index(), 7);
        session.handle_symbol(Symbol::Up).await.unwrap();
        assert_eq!(session.document().page_index(), 5);
    }

    #[tokio::test]
    async fn goto_last_and_first_spread() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "G").await;
        assert_eq!(session.document().page_index(), 8);
        press(&mut session, "g").await;
        assert_eq!(session.document().page_index(), 0);
        press(&mut session, "7G").await;
        assert_eq!(session.document().page_index(), 6);
    }

    #[tokio::test]
    async fn goto_spread_aligns_forward_to_split_boundary() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "4g").await;
        assert_eq!(session.document().page_number(), 5);
        press(&mut session, "3g").await;
        assert_eq!(session.document().page_number(), 3);
        press(&mut session, "1g").await;
        assert_eq!(session.document().page_number(), 1);
        // would land on page 11 of 10: rejected
        press(&mut session, "3G10g").await;
        assert_eq!(session.document().page_number(), 3);
        press(&mut session, "0g").await;
        assert_eq!(session.document().page_number(), 1);
    }

    #[test]
    fn aligned_page_numbers() {
        assert_eq!(aligned_page_number(1, 2), Some(1));
        assert_eq!(aligned_page_number(2, 2), Some(3));
        assert_eq!(aligned_page_number(3, 2), Some(3));
        assert_eq!(aligned_page_number(7, 3), Some(7));
        assert_eq!(aligned_page_number(8, 3), Some(10));
        assert_eq!(aligned_page_number(5, 1), Some(5));
        assert_eq!(aligned_page_number(usize::MAX, 3), None);
    }

    #[tokio::test]
    async fn oversized_counts_are_rejected() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "3G").await;
        assert_eq!(session.document().page_index(), 2);

        press(&mut session, "99999999999999999999G").await;
        assert_eq!(session.document().page_index(), 2);
        press(&mut session, "9223372036854775808G").await;
        assert_eq!(session.document().page_index(), 2);
        press(&mut session, "9223372036854775807G").await;
        assert_eq!(session.document().page_index(), 2);

        press(&mut session, "3s99999999999999999999g").await;
        assert_eq!(session.document().split_count(), 3);
        assert_eq!(session.document().page_index(), 2);

        press(&mut session, "99999999999999999999p").await;
        assert_eq!(session.document().page_index(), 2);
        press(&mut session, "99999999999999999999d").await;
        assert_eq!(session.document().page_number_delta(), None);

        press(&mut session, "9223372036854775807d").await;
        assert_eq!(session.document().real_page_number(), i64::MAX);
        press(&mut session, "1p").await;
        assert_eq!(session.document().page_index(), 2);
    }

    #[tokio::test]
    async fn single_page_moves_stop_at_document_edges() {
        let fixture = Fixture::new(&[("a.pdf", 4), ("b.pdf", 4)]);
        let mut session = fixture.open("b.pdf").await;

        press(&mut session, "K").await;
        assert_eq!(file_name(&session), "b.pdf");
        assert_eq!(session.document().page_index(), 0);

        press(&mut session, "4G").await;
        press(&mut session, "J").await;
        assert_eq!(file_name(&session), "b.pdf");
        assert_eq!(session.document().page_index(), 3);
        assert_eq!(session.document().read_log().len(), 1);

        assert!(fixture.store.load(&fixture.path("a.pdf")).unwrap().is_none());
        assert!(fixture.store.load(&fixture.path("b.pdf")).unwrap().is_none());
    }

    #[tokio::test]
    async fn split_prefix_must_be_in_range() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "5s").await;
        assert_eq!(session.document().split_count(), 5);
        press(&mut session, "15s").await;
        assert_eq!(session.document().split_count(), 5);
        press(&mut session, "s").await;
        assert_eq!(session.document().split_count(), 1);
        press(&mut session, "s").await;
        assert_eq!(session.document().split_count(), 2);
    }

    #[tokio::test]
    async fn blank_left_of_anchor() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "3J").await;
        press(&mut session, "H").await;
        let pages = session.document().pages();
        assert_eq!(pages.total_pages(), 11);
        assert_eq!(pages.actual_page(4), None);
        assert_eq!(pages.actual_page(5), Some(4));

        press(&mut session, "L").await;
        assert_eq!(session.document().pages().actual_page(3), None);
        press(&mut session, "b").await;
        assert!(session.document().pages().is_blank(0));
        press(&mut session, "b").await;
        assert!(!session.document().pages().is_blank(0));
    }

    #[tokio::test]
    async fn end_of_document_opens_next_sibling_at_start() {
        let fixture = Fixture::new(&[("a.pdf", 4), ("b.pdf", 6)]);
        fixture
            .store
            .save(
                &fixture.path("b.pdf"),
                &crate::PersistedDocumentState {
                    page_index: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "j").await;
        assert_eq!(session.document().page_index(), 2);
        press(&mut session, "j").await;
        assert_eq!(file_name(&session), "b.pdf");
        assert_eq!(session.document().page_index(), 0);

        let saved = fixture.store.load(&fixture.path("a.pdf")).unwrap().unwrap();
        assert_eq!(saved.page_index, Some(2));
    }

    #[tokio::test]
    async fn start_of_document_opens_previous_sibling_at_last_spread() {
        let fixture = Fixture::new(&[("a.pdf", 10), ("b.pdf", 4)]);
        let mut session = fixture.open("b.pdf").await;
        session.handle_symbol(Symbol::Left).await.unwrap();
        assert_eq!(file_name(&session), "a.pdf");
        assert_eq!(session.document().page_index(), 8);

        // wraps from the first document back to the last one
        press(&mut session, "g").await;
        press(&mut session, "k").await;
        assert_eq!(file_name(&session), "b.pdf");
        assert_eq!(session.document().page_index(), 2);
    }

    #[tokio::test]
    async fn unopenable_sibling_keeps_current_document() {
        let fixture = Fixture::new(&[("a.pdf", 4), ("b.pdf", 4)]);
        let mut session = fixture.open("a.pdf").await;
        // sibling exists on disk but cannot be opened by the provider
        std::fs::write(fixture.path("0.pdf"), b"dummy").unwrap();
        press(&mut session, "k").await;
        assert_eq!(file_name(&session), "a.pdf");
        assert_eq!(session.document().page_index(), 0);
        assert_eq!(session.document().read_log().len(), 2);
    }

    #[tokio::test]
    async fn marks_survive_through_interpreter() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "3J").await;
        assert_eq!(press(&mut session, "m").await, Outcome::Pending);
        press(&mut session, "a").await;
        press(&mut session, "G").await;
        press(&mut session, "'a").await;
        assert_eq!(session.document().page_index(), 3);
        press(&mut session, "'z").await;
        assert_eq!(session.document().page_index(), 3);
    }

    #[tokio::test]
    async fn printed_page_numbers() {
        let fixture = Fixture::new(&[("a.pdf", 30)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "13G").await;
        press(&mut session, "d").await;
        assert_eq!(session.document().real_page_number(), 1);
        press(&mut session, "5p").await;
        assert_eq!(session.document().page_number(), 17);
        press(&mut session, "D").await;
        assert_eq!(session.document().page_number_delta(), None);
    }

    #[tokio::test]
    async fn unknown_keys_request_no_redraw() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        assert_eq!(press(&mut session, "5").await, Outcome::Pending);
        assert_eq!(press(&mut session, "x").await, Outcome::Ignored);
        assert_eq!(session.pending_input().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn every_eleventh_command_saves() {
        let fixture = Fixture::new(&[("a.pdf", 40)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "JJJJJJJJJJ").await;
        assert!(fixture.store.load(&fixture.path("a.pdf")).unwrap().is_none());
        press(&mut session, "J").await;
        let saved = fixture.store.load(&fixture.path("a.pdf")).unwrap().unwrap();
        assert_eq!(saved.page_index, Some(11));
    }

    #[tokio::test]
    async fn reload_restores_saved_state() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "4Jw").await;
        press(&mut session, "vJ").await;
        assert!(session.document().inverted());
        press(&mut session, "r").await;
        assert!(!session.document().inverted());
        assert_eq!(session.document().page_index(), 4);
    }

    #[tokio::test]
    async fn quit_closes_and_persists() {
        let fixture = Fixture::new(&[("a.pdf", 10)]);
        let mut session = fixture.open("a.pdf").await;
        press(&mut session, "2J").await;
        assert_eq!(press(&mut session, "q").await, Outcome::Quit);
        let log = session.document().read_log();
        assert_eq!(log.last().and_then(|s| s.closed).map(|c| c.page_number), Some(3));
        let saved = fixture.store.load(&fixture.path("a.pdf")).unwrap().unwrap();
        assert_eq!(saved.page_index, Some(2));
        session.close().unwrap();
    }

    #[tokio::test]
    async fn hooks_run_for_chained_documents() {
        let fixture = Fixture::new(&[("a.pdf", 2), ("b.pdf", 2)]);
        let hook = |doc: &mut Document| {
            doc.set_split_count(1);
        };
        let hooks: Vec<Box<dyn OpenHook>> = vec![Box::new(hook)];
        let mut session = fixture.open_with_hooks("a.pdf", hooks).await;
        assert_eq!(session.document().split_count(), 1);
        press(&mut session, "jj").await;
        assert_eq!(file_name(&session), "b.pdf");
        assert_eq!(session.document().split_count(), 1);
    }

    #[tokio::test]
    async fn opening_unknown_document_fails() {
        let fixture = Fixture::new(&[("a.pdf", 2)]);
        let result = Session::open(
            fixture.provider.clone(),
            fixture.store.clone(),
            DirectoryChain::default(),
            Vec::new(),
            fixture.path("missing.pdf"),
        )
        .await;
        assert!(result.is_err());
    }
}
