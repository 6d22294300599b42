use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType, SetTitle},
};
use png::{BitDepth, ColorType, Encoder};
use spreadpdf_core::{RenderImage, Symbol};
use tracing::trace;

const CHUNK_SIZE: usize = 4096;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
    placed: bool,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
            placed: false,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, replacing the previous spread.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(encode_png(image)?);
        trace!(bytes = encoded.len(), "transmitting spread");

        self.delete_placement()?;

        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        self.placed = true;

        self.writer.flush()?;
        Ok(())
    }

    /// Removes the current placement and frees its image data.
    pub fn delete_placement(&mut self) -> Result<()> {
        if self.placed {
            write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
            self.placed = false;
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal shows the buffered frame at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.delete_placement()?;
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Input(Symbol),
    Redraw,
    /// The window is going away; close the document and stop.
    Close,
    None,
}

/// Translates terminal events into interpreter symbols. Count prefixes and
/// label sequences are the interpreter's business, so this holds no state.
#[derive(Debug, Default)]
pub struct SymbolMapper;

impl SymbolMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map_event(&self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) => map_key(key),
            Event::Mouse(MouseEvent { kind, .. }) => match kind {
                MouseEventKind::ScrollDown => UiEvent::Input(Symbol::ScrollDown),
                MouseEventKind::ScrollUp => UiEvent::Input(Symbol::ScrollUp),
                _ => UiEvent::None,
            },
            Event::Resize(_, _) => UiEvent::Redraw,
            _ => UiEvent::None,
        }
    }
}

fn map_key(key: KeyEvent) -> UiEvent {
    if key.kind == KeyEventKind::Release {
        return UiEvent::None;
    }
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => UiEvent::Close,
        (KeyCode::Char(c), modifiers)
            if modifiers == KeyModifiers::NONE || modifiers == KeyModifiers::SHIFT =>
        {
            UiEvent::Input(Symbol::Char(c))
        }
        (KeyCode::Up, KeyModifiers::NONE) => UiEvent::Input(Symbol::Up),
        (KeyCode::Down, KeyModifiers::NONE) => UiEvent::Input(Symbol::Down),
        (KeyCode::Left, KeyModifiers::NONE) => UiEvent::Input(Symbol::Left),
        (KeyCode::Right, KeyModifiers::NONE) => UiEvent::Input(Symbol::Right),
        _ => UiEvent::None,
    }
}

/// Joins the document title and whatever has been typed towards the next command.
pub fn status_text(title: &str, pending_input: Option<&str>) -> String {
    match pending_input.filter(|pending| !pending.is_empty()) {
        Some(pending) => format!("{} | {}", title, pending),
        None => title.to_string(),
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str, columns: u16) -> io::Result<()> {
    let visible: String = label.chars().take(usize::from(columns)).collect();
    write!(writer, "{}", visible)?;
    writer.flush()
}

pub fn set_window_title<W: Write>(writer: &mut W, title: &str) -> io::Result<()> {
    crossterm::execute!(writer, SetTitle(title))
}
