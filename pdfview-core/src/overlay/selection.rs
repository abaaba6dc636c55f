use std::ops::{Range, RangeInclusive};

use crate::backend::CharGlyph;
use crate::geometry::{Point, Rect};

/// Side of the square used to hit-test chars under the cursor.
pub const CHAR_HIT_SIZE: f32 = 15.0;
pub const WORD_HIT_SIZE: f32 = 10.0;

/// First char, in document order, whose box intersects the hit square at `point`.
pub fn char_index_at(chars: &[CharGlyph], point: Point, side: f32) -> Option<usize> {
    let hit = Rect::from_point_size(point, side, side);
    chars.iter().position(|glyph| glyph.bbox.intersects(&hit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharPos {
    pub page_index: usize,
    pub char_index: usize,
}

impl CharPos {
    pub const fn new(page_index: usize, char_index: usize) -> Self {
        Self {
            page_index,
            char_index,
        }
    }
}

/// Anchor and focus of a drag selection; either end may come first in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    start: Option<CharPos>,
    end: Option<CharPos>,
}

impl Selection {
    pub fn begin(&mut self, pos: CharPos) {
        self.start = Some(pos);
        self.end = None;
    }

    /// Moves the focus; the first hit of a drag becomes the anchor.
    pub fn extend(&mut self, pos: CharPos) {
        if self.start.is_none() {
            self.start = Some(pos);
        } else {
            self.end = Some(pos);
        }
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
    }

    pub fn start(&self) -> Option<CharPos> {
        self.start
    }

    pub fn end(&self) -> Option<CharPos> {
        self.end
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn ordered(&self) -> Option<(CharPos, CharPos)> {
        let (start, end) = (self.start?, self.end?);
        Some((start.min(end), start.max(end)))
    }

    pub fn pages(&self) -> Option<RangeInclusive<usize>> {
        let (first, last) = self.ordered()?;
        Some(first.page_index..=last.page_index)
    }

    /// Char range selected on `page_index`, clamped to the page's `char_count`.
    pub fn span_on(&self, page_index: usize, char_count: usize) -> Option<Range<usize>> {
        let (first, last) = self.ordered()?;
        if page_index < first.page_index || page_index > last.page_index {
            return None;
        }
        let start = if page_index == first.page_index {
            first.char_index
        } else {
            0
        };
        let end = if page_index == last.page_index {
            last.char_index.saturating_add(1)
        } else {
            char_count
        }
        .min(char_count);
        (start < end).then_some(start..end)
    }
}

/// The next char starts left of the previous one's right edge, or shares no vertical extent
/// with it (a jump to the top of the next column).
fn starts_new_line(prev: &CharGlyph, next: &CharGlyph) -> bool {
    next.bbox.x0 < prev.bbox.x1 || next.bbox.y0 >= prev.bbox.y1 || next.bbox.y1 <= prev.bbox.y0
}

/// Splits a run of chars into visual lines.
pub fn line_runs(chars: &[CharGlyph]) -> Vec<&[CharGlyph]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..chars.len() {
        if starts_new_line(&chars[i - 1], &chars[i]) {
            runs.push(&chars[start..i]);
            start = i;
        }
    }
    if start < chars.len() {
        runs.push(&chars[start..]);
    }
    runs
}

/// Minimal covering rectangles, one per line run.
pub fn line_rects(chars: &[CharGlyph]) -> Vec<Rect> {
    line_runs(chars)
        .into_iter()
        .filter_map(|run| {
            let rect = run
                .iter()
                .map(|glyph| glyph.bbox)
                .reduce(|a, b| a.union(&b))?;
            Some(if rect.is_valid() {
                rect
            } else {
                Rect::new(rect.x0, rect.y0, rect.x0 + 1.0, rect.y0 + 1.0)
            })
        })
        .collect()
}

/// Joins the line runs of every selected piece with a blank line between them.
pub fn selected_text<'a, I>(pieces: I) -> String
where
    I: IntoIterator<Item = &'a [CharGlyph]>,
{
    pieces
        .into_iter()
        .flat_map(line_runs)
        .map(|run| run.iter().map(|glyph| glyph.ch).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whitespace-separated word whose box intersects the hit square at `point`.
pub fn word_at(chars: &[CharGlyph], point: Point) -> Option<(String, Rect)> {
    let hit = Rect::from_point_size(point, WORD_HIT_SIZE, WORD_HIT_SIZE);
    let mut word = String::new();
    let mut bounds: Option<Rect> = None;
    let mut prev: Option<&CharGlyph> = None;
    let flush = |word: &mut String, bounds: &mut Option<Rect>| {
        let found = bounds
            .filter(|b| b.intersects(&hit) && !word.is_empty())
            .map(|b| (word.clone(), b));
        word.clear();
        *bounds = None;
        found
    };
    for glyph in chars {
        let breaks_line = prev.map_or(false, |p| starts_new_line(p, glyph));
        if glyph.ch.is_whitespace() || breaks_line {
            if let Some(found) = flush(&mut word, &mut bounds) {
                return Some(found);
            }
        }
        prev = Some(glyph);
        if glyph.ch.is_whitespace() {
            continue;
        }
        word.push(glyph.ch);
        bounds = Some(match bounds {
            Some(b) => b.union(&glyph.bbox),
            None => glyph.bbox,
        });
    }
    flush(&mut word, &mut bounds)
}
