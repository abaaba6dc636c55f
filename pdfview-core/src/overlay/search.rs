use std::cmp::Ordering;
use std::time::Duration;

use crate::geometry::Quad;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchMatch {
    pub page_index: usize,
    /// Page-space quad of the hit; its scroll offset is derived from the current layout.
    pub quad: Quad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    term: String,
    matches: Vec<SearchMatch>,
    current: usize,
}

impl SearchState {
    /// Returns `None` when there is nothing to highlight. The current match is the first one
    /// at or after `current_page`, wrapping to the first match of the document.
    pub fn new(
        term: impl Into<String>,
        mut matches: Vec<SearchMatch>,
        current_page: usize,
    ) -> Option<Self> {
        if matches.is_empty() {
            return None;
        }
        matches.sort_by(|a, b| {
            a.page_index.cmp(&b.page_index).then_with(|| {
                a.quad
                    .ul
                    .y
                    .partial_cmp(&b.quad.ul.y)
                    .unwrap_or(Ordering::Equal)
                    .then(a.quad.ul.x.partial_cmp(&b.quad.ul.x).unwrap_or(Ordering::Equal))
            })
        });
        let current = matches
            .iter()
            .position(|m| m.page_index >= current_page)
            .unwrap_or(0);
        Some(Self {
            term: term.into(),
            matches,
            current,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &SearchMatch {
        &self.matches[self.current]
    }

    pub fn next(&mut self) -> &SearchMatch {
        self.current = (self.current + 1) % self.matches.len();
        self.current()
    }

    pub fn previous(&mut self) -> &SearchMatch {
        self.current = (self.current + self.matches.len() - 1) % self.matches.len();
        self.current()
    }

    /// Matches of one page with their position in the overall list.
    pub fn matches_on(&self, page_index: usize) -> impl Iterator<Item = (usize, &SearchMatch)> {
        self.matches
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.page_index == page_index)
    }

    pub fn pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.matches.iter().map(|m| m.page_index).collect();
        pages.dedup();
        pages
    }

    /// "3/12" style position shown to the user.
    pub fn progress_label(&self) -> String {
        format!("{}/{}", self.current + 1, self.matches.len())
    }
}

/// Debounce before searching as the user types; long documents and short terms wait longer.
pub fn search_delay(page_count: usize, term: &str) -> Duration {
    let length = term.chars().count().max(1) as f64;
    let secs = (page_count as f64 / 200.0).min(1.0) + 0.8 / length;
    Duration::from_secs_f64(secs)
}

/// Scroll offset that brings `target` into view, or `None` when it already sits inside the
/// 5%..95% band of the viewport.
pub fn scroll_for_match(target: f32, scroll_offset: f32, viewport_height: f32) -> Option<f32> {
    let top = scroll_offset + viewport_height * 0.05;
    let bottom = scroll_offset + viewport_height * 0.95;
    if target < top || target > bottom {
        Some((target - viewport_height * 0.05).max(0.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn hit(page_index: usize, y: f32) -> SearchMatch {
        SearchMatch {
            page_index,
            quad: Quad::from_rect(Rect::new(10.0, y, 40.0, y + 10.0)),
        }
    }

    #[test]
    fn next_cycles_through_matches() {
        let mut state =
            SearchState::new("term", vec![hit(2, 10.0), hit(2, 50.0), hit(5, 10.0)], 0).unwrap();
        assert_eq!(state.current_index(), 0);
        state.next();
        assert_eq!(state.current_index(), 1);
        state.next();
        assert_eq!(state.current_index(), 2);
        state.next();
        assert_eq!(state.current_index(), 0);
        state.previous();
        assert_eq!(state.current_index(), 2);
        assert_eq!(state.progress_label(), "3/3");
    }

    #[test]
    fn starts_at_first_match_on_or_after_current_page() {
        let matches = vec![hit(1, 0.0), hit(4, 0.0), hit(4, 30.0), hit(9, 0.0)];
        assert_eq!(SearchState::new("t", matches.clone(), 3).unwrap().current_index(), 1);
        assert_eq!(SearchState::new("t", matches.clone(), 4).unwrap().current_index(), 1);
        assert_eq!(SearchState::new("t", matches, 10).unwrap().current_index(), 0);
    }

    #[test]
    fn matches_are_sorted_by_page_then_position() {
        let matches = vec![hit(3, 90.0), hit(1, 5.0), hit(3, 20.0)];
        let state = SearchState::new("t", matches, 0).unwrap();
        let order: Vec<(usize, f32)> = (0..state.len())
            .map(|i| {
                let m = &state.matches[i];
                (m.page_index, m.quad.ul.y)
            })
            .collect();
        assert_eq!(order, vec![(1, 5.0), (3, 20.0), (3, 90.0)]);
        assert_eq!(state.matches_on(3).count(), 2);
        assert_eq!(state.pages(), vec![1, 3]);
    }

    #[test]
    fn empty_results_produce_no_state() {
        assert!(SearchState::new("nothing", Vec::new(), 0).is_none());
    }

    #[test]
    fn delay_depends_on_pages_and_term() {
        assert_eq!(search_delay(100, "abcd"), Duration::from_secs_f64(0.5 + 0.2));
        assert_eq!(search_delay(1000, "ab"), Duration::from_secs_f64(1.4));
    }

    #[test]
    fn comfort_band_avoids_needless_scrolling() {
        assert_eq!(scroll_for_match(500.0, 0.0, 1000.0), None);
        assert_eq!(scroll_for_match(2000.0, 0.0, 1000.0), Some(1950.0));
        assert_eq!(scroll_for_match(10.0, 400.0, 1000.0), Some(0.0));
    }
}
