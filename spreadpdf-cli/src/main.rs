use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType, WindowSize};
use directories::ProjectDirs;
use spreadpdf_core::{
    compose_spread, DirectoryChain, DocumentProvider, FileStateStore, OpenHook, OpenSettings,
    Outcome, Session, StateStore,
};
use spreadpdf_render::PdfRenderFactory;
use spreadpdf_tty::{
    set_window_title, status_text, write_status_line, DrawParams, KittyRenderer, SymbolMapper,
    UiEvent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

// used when the terminal does not report its pixel size
const FALLBACK_CELL_WIDTH: u32 = 8;
const FALLBACK_CELL_HEIGHT: u32 = 16;

#[derive(Debug, Parser)]
#[command(
    name = "spreadpdf",
    version,
    about = "Read PDFs in the terminal as multi-page spreads"
)]
struct Args {
    /// PDF file to open
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::Hide, EnableMouseCapture)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.kind() == ErrorKind::MissingRequiredArgument => {
            println!("{}", Args::command().render_usage());
            std::process::exit(1);
        }
        Err(err) => err.exit(),
    };

    let project_dirs = ProjectDirs::from("net", "spreadpdf", "spreadpdf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(
        project_dirs.data_local_dir().join("saves.json"),
    )?);
    let provider: Arc<dyn DocumentProvider> = Arc::new(PdfRenderFactory::new()?);
    let hooks = load_hooks(&project_dirs.config_dir().join("hooks.toml"));

    let mut session = Session::open(
        provider,
        store,
        DirectoryChain::default(),
        hooks,
        args.file.clone(),
    )
    .await
    .with_context(|| format!("failed to open {:?}", args.file))?;

    let result = run(&mut session).await;
    if let Err(err) = session.close() {
        warn!(?err, "failed to save state on exit");
    }
    result
}

async fn run(session: &mut Session) -> Result<()> {
    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mapper = SymbolMapper::new();
    renderer.clear_all()?;
    redraw(&mut renderer, session)?;

    loop {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match mapper.map_event(event::read()?) {
            UiEvent::Input(symbol) => match session.handle_symbol(symbol).await? {
                Outcome::Quit => break,
                Outcome::Redraw => redraw(&mut renderer, session)?,
                Outcome::Pending | Outcome::Ignored => draw_status_line(&mut renderer, session)?,
            },
            UiEvent::Redraw => {
                renderer.clear_all()?;
                redraw(&mut renderer, session)?;
            }
            UiEvent::Close => {
                info!("window closed");
                break;
            }
            UiEvent::None => {}
        }
    }

    renderer.clear_all()?;
    Ok(())
}

fn load_hooks(path: &Path) -> Vec<Box<dyn OpenHook>> {
    let mut hooks: Vec<Box<dyn OpenHook>> = Vec::new();
    match OpenSettings::load(path) {
        Ok(Some(settings)) => {
            info!(?settings, "registered open hook");
            hooks.push(Box::new(settings));
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring hook file"),
    }
    hooks
}

fn redraw(renderer: &mut KittyRenderer<io::Stdout>, session: &Session) -> Result<()> {
    let window = terminal::window_size()?;
    let columns = window.columns.max(1);
    let image_rows = window.rows.max(2) - 1;
    let (cell_width, cell_height) = cell_size(&window);
    let width = cell_width * u32::from(columns);
    let height = cell_height * u32::from(image_rows);

    renderer.begin_sync_update()?;
    match compose_spread(session.document(), width, height) {
        Some(image) => {
            crossterm::execute!(renderer.writer(), cursor::MoveTo(0, 0))?;
            renderer.draw(
                &image,
                DrawParams::clamped(u32::from(columns), u32::from(image_rows)),
            )?;
        }
        None => {
            warn!(width, height, "nothing to draw for this spread");
            renderer.delete_placement()?;
        }
    }
    draw_status_line(renderer, session)?;
    set_window_title(renderer.writer(), &session.document().title())?;
    renderer.end_sync_update()
}

fn cell_size(window: &WindowSize) -> (u32, u32) {
    if window.width == 0 || window.height == 0 || window.columns == 0 || window.rows == 0 {
        return (FALLBACK_CELL_WIDTH, FALLBACK_CELL_HEIGHT);
    }
    (
        (u32::from(window.width) / u32::from(window.columns)).max(1),
        (u32::from(window.height) / u32::from(window.rows)).max(1),
    )
}

fn draw_status_line(renderer: &mut KittyRenderer<io::Stdout>, session: &Session) -> Result<()> {
    let (columns, rows) = terminal::size()?;
    let status = status_text(
        &session.document().title(),
        session.pending_input().as_deref(),
    );
    let writer = renderer.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, &status, columns)?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "spreadpdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // no console layer: the terminal belongs to the renderer while reading
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
