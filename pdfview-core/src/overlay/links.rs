use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;

use crate::backend::Link;
use crate::geometry::Rect;

pub const DEFAULT_MARKER_LETTERS: &str = "ASDFHJKLWEOPCMN";

/// Shortest label length that gives `count` distinct labels over `alphabet_len` letters.
pub fn label_length(count: usize, alphabet_len: usize) -> usize {
    if count <= 1 || alphabet_len < 2 {
        return 1;
    }
    let mut length = 1;
    let mut capacity = alphabet_len;
    while capacity < count {
        length += 1;
        capacity = capacity.saturating_mul(alphabet_len);
    }
    length
}

/// Draws `count` random labels that are unique among themselves and absent from `taken`.
pub fn generate_labels<R: Rng + ?Sized>(
    count: usize,
    alphabet: &[char],
    taken: &HashSet<String>,
    rng: &mut R,
) -> Vec<String> {
    if count == 0 || alphabet.is_empty() {
        return Vec::new();
    }
    let mut length = label_length(count, alphabet.len());
    loop {
        let capacity = (alphabet.len() as u128).saturating_pow(length as u32);
        let used = taken.iter().filter(|l| l.chars().count() == length).count() as u128;
        if capacity.saturating_sub(used) >= count as u128 {
            break;
        }
        length += 1;
    }

    let mut labels = Vec::with_capacity(count);
    let mut seen = HashSet::with_capacity(count);
    while labels.len() < count {
        let label: String = (0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        if taken.contains(&label) || !seen.insert(label.clone()) {
            continue;
        }
        labels.push(label);
    }
    labels
}

/// Box drawn at a link's top-left corner to show its label.
pub fn label_rect(link_rect: Rect, label: &str, font_size: f32) -> Rect {
    let width = font_size / 1.2 * label.chars().count() as f32;
    Rect::from_point_size(link_rect.top_left(), width, font_size)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub label: String,
    pub rect: Rect,
}

/// Labels handed out per page while the jump-to-link prompt is open.
#[derive(Debug, Clone)]
pub struct JumpLabels {
    alphabet: Vec<char>,
    font_size: f32,
    targets: HashMap<String, (usize, Link)>,
    placed: BTreeMap<usize, Vec<PlacedLabel>>,
}

impl JumpLabels {
    pub fn new(letters: &str, font_size: f32) -> Self {
        let mut alphabet: Vec<char> = Vec::new();
        for ch in letters.chars().flat_map(char::to_uppercase) {
            if !ch.is_whitespace() && !alphabet.contains(&ch) {
                alphabet.push(ch);
            }
        }
        if alphabet.len() < 2 {
            alphabet = DEFAULT_MARKER_LETTERS.chars().collect();
        }
        Self {
            alphabet,
            font_size,
            targets: HashMap::new(),
            placed: BTreeMap::new(),
        }
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Labels every link of a page once; later calls return the same labels.
    pub fn assign<R: Rng + ?Sized>(
        &mut self,
        page_index: usize,
        links: &[Link],
        rng: &mut R,
    ) -> &[PlacedLabel] {
        if !self.placed.contains_key(&page_index) {
            let taken: HashSet<String> = self.targets.keys().cloned().collect();
            let labels = generate_labels(links.len(), &self.alphabet, &taken, rng);
            let mut placed = Vec::with_capacity(labels.len());
            for (label, link) in labels.into_iter().zip(links) {
                placed.push(PlacedLabel {
                    rect: label_rect(link.rect, &label, self.font_size),
                    label: label.clone(),
                });
                self.targets.insert(label, (page_index, link.clone()));
            }
            self.placed.insert(page_index, placed);
        }
        self.labels_on(page_index)
    }

    pub fn labels_on(&self, page_index: usize) -> &[PlacedLabel] {
        self.placed
            .get(&page_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resolve(&self, input: &str) -> Option<&(usize, Link)> {
        self.targets.get(&input.trim().to_uppercase())
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.placed.clear();
    }
}
