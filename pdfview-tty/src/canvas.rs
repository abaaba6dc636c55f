use pdfview_core::{Bitmap, Color, Frame, Rect};

/// Colours for the parts of a frame the viewer only describes as rectangles.
/// Jump-label boxes are already drawn into the page bitmaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStyle {
    pub selection: Color,
    pub synctex_marker: Color,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            selection: Color::rgb(0x66, 0x99, 0xFF),
            synctex_marker: Color::rgb(0xDD, 0x22, 0x22),
        }
    }
}

const SELECTION_ALPHA: f32 = 0.35;
const MARKER_ALPHA: f32 = 0.7;

/// Flattens a frame into one RGBA image covering the whole viewport.
pub fn compose(frame: &Frame, style: &FrameStyle) -> Bitmap {
    let scale = frame.viewport.device_scale.max(f32::EPSILON);
    let width = (frame.viewport.width * scale).round().max(1.0) as u32;
    let height = (frame.viewport.height * scale).round().max(1.0) as u32;
    let mut canvas = Bitmap::new(width, height, frame.background);

    for page in &frame.pages {
        let x = (page.rect.x0 * scale).round() as i64;
        let y = (page.rect.y0 * scale).round() as i64;
        blit(&mut canvas, &page.bitmap, x, y);
        for rect in &page.selection {
            tint(&mut canvas, scaled(*rect, scale), style.selection, SELECTION_ALPHA);
        }
    }
    if let Some(marker) = frame.synctex_marker {
        tint(&mut canvas, scaled(marker, scale), style.synctex_marker, MARKER_ALPHA);
    }
    canvas
}

fn scaled(rect: Rect, scale: f32) -> Rect {
    Rect::new(
        rect.x0 * scale,
        rect.y0 * scale,
        rect.x1 * scale,
        rect.y1 * scale,
    )
}

/// Copies `source` with its top-left corner at `(x, y)`, dropping whatever falls outside.
fn blit(canvas: &mut Bitmap, source: &Bitmap, x: i64, y: i64) {
    let left = x.max(0);
    let right = (x + source.width as i64).min(canvas.width as i64);
    if left >= right {
        return;
    }
    let span = (right - left) as usize * 4;
    let source_x = (left - x) as usize * 4;
    for row in 0..source.height as i64 {
        let target_y = y + row;
        if target_y < 0 {
            continue;
        }
        if target_y >= canvas.height as i64 {
            break;
        }
        let from = row as usize * source.stride + source_x;
        let to = target_y as usize * canvas.stride + left as usize * 4;
        let (Some(src), Some(dst)) = (
            source.pixels.get(from..from + span),
            canvas.pixels.get_mut(to..to + span),
        ) else {
            continue;
        };
        dst.copy_from_slice(src);
    }
}

fn tint(canvas: &mut Bitmap, rect: Rect, color: Color, alpha: f32) {
    let x0 = rect.x0.floor().max(0.0) as u32;
    let y0 = rect.y0.floor().max(0.0) as u32;
    let x1 = (rect.x1.ceil().max(0.0) as u32).min(canvas.width);
    let y1 = (rect.y1.ceil().max(0.0) as u32).min(canvas.height);
    let blend = |from: u8, to: u8| (from as f32 * (1.0 - alpha) + to as f32 * alpha).round() as u8;
    for y in y0..y1 {
        for x in x0..x1 {
            let idx = y as usize * canvas.stride + x as usize * 4;
            if let Some(px) = canvas.pixels.get_mut(idx..idx + 3) {
                px[0] = blend(px[0], color.r);
                px[1] = blend(px[1], color.g);
                px[2] = blend(px[2], color.b);
            }
        }
    }
}
