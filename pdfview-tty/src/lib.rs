use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use pdfview_core::{Bitmap, Frame};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

mod canvas;
mod input;

pub use canvas::{compose, FrameStyle};
pub use input::{EventMapper, InputMode, UiEvent};

/// Cell and pixel dimensions of the terminal window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalGrid {
    pub columns: u16,
    pub rows: u16,
    pub width_px: u32,
    pub height_px: u32,
}

impl TerminalGrid {
    /// Terminals that do not report a pixel size are assumed to use 8x16 cells.
    pub fn new(columns: u16, rows: u16, width_px: u32, height_px: u32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let width_px = if width_px == 0 {
            u32::from(columns) * 8
        } else {
            width_px
        };
        let height_px = if height_px == 0 {
            u32::from(rows) * 16
        } else {
            height_px
        };
        Self {
            columns,
            rows,
            width_px,
            height_px,
        }
    }

    pub fn cell_size(&self) -> (f32, f32) {
        (
            self.width_px as f32 / f32::from(self.columns),
            self.height_px as f32 / f32::from(self.rows),
        )
    }

    /// Rows left for the page image once the status line is reserved.
    pub fn image_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    /// Pixel size of the image area.
    pub fn image_size(&self) -> (f32, f32) {
        let (_, cell_height) = self.cell_size();
        (
            self.width_px as f32,
            cell_height * f32::from(self.image_rows()),
        )
    }

    pub fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    fn cell_at(&self, x: f32, y: f32) -> Option<(u16, u16)> {
        let (cell_width, cell_height) = self.cell_size();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let column = (x / cell_width) as u16;
        let row = (y / cell_height) as u16;
        (column < self.columns && row < self.image_rows()).then_some((column, row))
    }
}

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
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
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Composes `frame` into one image over the image rows, then prints jump labels on top.
    pub fn draw_frame(
        &mut self,
        frame: &Frame,
        style: &FrameStyle,
        grid: &TerminalGrid,
    ) -> Result<()> {
        let image = compose(frame, style);
        trace!(width = image.width, height = image.height, "drawing frame");
        self.begin_sync_update()?;
        crossterm::queue!(&mut self.writer, cursor::MoveTo(0, 0))?;
        self.draw(
            &image,
            DrawParams::clamped(u32::from(grid.columns), u32::from(grid.image_rows())),
        )?;
        for page in &frame.pages {
            for label in &page.labels {
                if let Some((column, row)) = grid.cell_at(label.rect.x0, label.rect.y0) {
                    print_inverted(&mut self.writer, column, row, &label.label)?;
                }
            }
        }
        self.end_sync_update()
    }

    pub fn draw(&mut self, image: &Bitmap, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
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
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image this renderer placed.
    pub fn delete_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    pub fn draw_status_line(&mut self, grid: &TerminalGrid, status: &str) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            cursor::MoveTo(0, grid.status_row()),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(&mut self.writer, status)?;
        Ok(())
    }
}

pub fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

/// Left-aligns `message` and right-aligns `progress` within `width` columns.
/// The message is cut short when both do not fit.
pub fn format_status(message: &str, progress: Option<&str>, width: usize) -> String {
    let progress = progress.unwrap_or("");
    let progress_len = progress.chars().count();
    let room = width.saturating_sub(progress_len + usize::from(progress_len > 0));
    let message: String = message.chars().take(room).collect();
    let gap = width.saturating_sub(message.chars().count() + progress_len);
    if progress.is_empty() {
        return message;
    }
    format!("{message}{}{progress}", " ".repeat(gap))
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pdfview_core::{Color, PageDraw, PlacedLabel, Rect, ViewportSize};

    use super::*;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = Bitmap::new(1, 1, Color::rgb(255, 0, 0));

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.writer;
        assert_eq!(output[0], 0x1b);
        assert_eq!(output[1], b'_');
        assert_eq!(output[2], b'G');
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5,s=1,v=1"));
        assert!(text.ends_with("\u{1b}\\"));
    }

    #[test]
    fn draw_frame_prints_labels_over_image() {
        let grid = TerminalGrid::new(10, 6, 100, 120);
        let frame = Frame {
            viewport: ViewportSize::new(100.0, 100.0),
            background: Color::WHITE,
            foreground: Color::BLACK,
            pages: vec![PageDraw {
                page_index: 0,
                rect: Rect::new(0.0, 0.0, 100.0, 100.0),
                bitmap: Arc::new(Bitmap::new(100, 100, Color::WHITE)),
                selection: Vec::new(),
                labels: vec![PlacedLabel {
                    label: "AS".to_string(),
                    rect: Rect::new(35.0, 45.0, 50.0, 55.0),
                }],
            }],
            progress: None,
            synctex_marker: None,
        };
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw_frame(&frame, &FrameStyle::default(), &grid)
            .unwrap();
        let text = String::from_utf8_lossy(&renderer.writer).into_owned();
        assert!(text.starts_with("\u{1b}[?2026h"));
        assert!(text.contains("c=10,r=5"));
        // column 3, row 2, one-based in the escape sequence
        assert!(text.contains("\u{1b}[3;4H"));
        assert!(text.contains("AS"));
        assert!(text.ends_with("\u{1b}[?2026l"));
    }

    #[test]
    fn grid_falls_back_to_nominal_cell_size() {
        let grid = TerminalGrid::new(80, 25, 0, 0);
        assert_eq!(grid.cell_size(), (8.0, 16.0));
        assert_eq!(grid.image_rows(), 24);
        assert_eq!(grid.image_size(), (640.0, 384.0));
        assert_eq!(grid.status_row(), 24);
        assert_eq!(grid.cell_at(639.0, 383.0), Some((79, 23)));
        assert_eq!(grid.cell_at(10.0, 390.0), None);
    }

    #[test]
    fn format_status_aligns_progress_right() {
        assert_eq!(format_status("hi", Some("50%"), 10), "hi     50%");
        assert_eq!(format_status("a long message", Some("50%"), 10), "a long 50%");
        assert_eq!(format_status("hi", None, 10), "hi");
    }

    #[test]
    fn write_status_line_writes_label() {
        let mut out = Vec::new();
        write_status_line(&mut out, "Search: foo").unwrap();
        assert_eq!(out, b"Search: foo");
    }
}
