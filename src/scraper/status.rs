//! Availability glyph vocabulary.
//!
//! The reservation site marks cells with glyphs (`○ △ ×`), Japanese keywords
//! (`空き`, `休館`) or small images whose alt text / file name carries the
//! same meaning. Every extraction surface classifies cells through
//! [`normalize`] so they agree on what counts as bookable.

use crate::models::SlotStatus;

/// Classification of one schedule cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Available,
    Limited,
    /// Full, closed, or not recognisable; never materialized.
    Discard,
}

impl Verdict {
    pub fn status(self) -> Option<SlotStatus> {
        match self {
            Self::Available => Some(SlotStatus::Available),
            Self::Limited => Some(SlotStatus::Limited),
            Self::Discard => None,
        }
    }
}

/// Ordered mapping from tokens to verdicts; the first matching entry wins.
///
/// Phrases that embed a positive token (`空きなし` contains `空`) must come
/// before the glyph entries.
const TEXT_VOCABULARY: &[(&str, Verdict)] = &[
    ("空きなし", Verdict::Discard),
    ("空き無し", Verdict::Discard),
    ("空無", Verdict::Discard),
    ("unavailable", Verdict::Discard),
    ("not available", Verdict::Discard),
    ("○", Verdict::Available),
    ("◯", Verdict::Available),
    ("〇", Verdict::Available),
    ("◎", Verdict::Available),
    ("空", Verdict::Available),
    ("available", Verdict::Available),
    ("vacant", Verdict::Available),
    ("open", Verdict::Available),
    ("△", Verdict::Limited),
    ("▲", Verdict::Limited),
    ("残りわずか", Verdict::Limited),
    ("残少", Verdict::Limited),
    ("few", Verdict::Limited),
    ("limited", Verdict::Limited),
    ("×", Verdict::Discard),
    ("✕", Verdict::Discard),
    ("✖", Verdict::Discard),
    ("╳", Verdict::Discard),
    ("満", Verdict::Discard),
    ("休", Verdict::Discard),
    ("不可", Verdict::Discard),
    ("受付終了", Verdict::Discard),
    ("closed", Verdict::Discard),
    ("full", Verdict::Discard),
    ("-", Verdict::Discard),
    ("ー", Verdict::Discard),
    ("－", Verdict::Discard),
    ("―", Verdict::Discard),
];

/// Tokens found in status image alt text and file names (`maru.gif`, `icon_batsu.png`).
///
/// Punctuation glyphs are left out because file names are full of hyphens.
const IMAGE_VOCABULARY: &[(&str, Verdict)] = &[
    ("空きなし", Verdict::Discard),
    ("unavailable", Verdict::Discard),
    ("○", Verdict::Available),
    ("◯", Verdict::Available),
    ("空", Verdict::Available),
    ("circle", Verdict::Available),
    ("maru", Verdict::Available),
    ("vacant", Verdict::Available),
    ("available", Verdict::Available),
    ("△", Verdict::Limited),
    ("triangle", Verdict::Limited),
    ("sankaku", Verdict::Limited),
    ("few", Verdict::Limited),
    ("limited", Verdict::Limited),
    ("×", Verdict::Discard),
    ("cross", Verdict::Discard),
    ("batsu", Verdict::Discard),
    ("満", Verdict::Discard),
    ("休", Verdict::Discard),
    ("full", Verdict::Discard),
    ("closed", Verdict::Discard),
];

/// Glyphs whose presence marks a table as a schedule rather than layout.
const INDICATORS: &[&str] = &[
    "○", "◯", "〇", "△", "▲", "×", "✕", "空", "満", "休", "残りわずか",
];

fn lookup(haystack: &str, vocabulary: &[(&str, Verdict)]) -> Option<Verdict> {
    let haystack = haystack.trim().to_lowercase();
    if haystack.is_empty() {
        return None;
    }
    vocabulary
        .iter()
        .find(|(token, _)| haystack.contains(token))
        .map(|&(_, verdict)| verdict)
}

/// Signal carried by a cell's visible text, if any.
pub fn classify_text(text: &str) -> Option<Verdict> {
    lookup(text, TEXT_VOCABULARY)
}

/// Signal carried by image hints (alt text, `src`), first recognised hint wins.
pub fn classify_images<S: AsRef<str>>(hints: &[S]) -> Option<Verdict> {
    hints
        .iter()
        .find_map(|hint| lookup(hint.as_ref(), IMAGE_VOCABULARY))
}

/// Map raw cell text and image hints to a verdict.
///
/// An image signal overrides the text signal, whether the text was ambiguous
/// or clashing. Cells recognised by neither vocabulary are discarded.
pub fn normalize<S: AsRef<str>>(raw_text: &str, image_hints: &[S]) -> Verdict {
    classify_images(image_hints)
        .or_else(|| classify_text(raw_text))
        .unwrap_or(Verdict::Discard)
}

/// Whether a block of text mentions any availability glyph.
pub fn mentions_indicator(text: &str) -> bool {
    INDICATORS.iter().any(|glyph| text.contains(glyph))
}

/// Whether an image hint (alt/src) carries any status meaning.
pub fn image_is_indicator(hint: &str) -> bool {
    lookup(hint, IMAGE_VOCABULARY).is_some()
}
