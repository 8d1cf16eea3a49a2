//! Word-list matcher shared by the built-in adapters

use adcomply_core::{Error, ModerationCategory, Result};
use aho_corasick::{AhoCorasick, MatchKind};

/// Case-insensitive whole-word matcher
pub(crate) struct Lexicon {
    automaton: AhoCorasick,
}

impl Lexicon {
    pub(crate) fn new(category: ModerationCategory, words: &[&str]) -> Result<Self> {
        let words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&words)
            .map_err(|e| {
                Error::model_unavailable(category.as_str(), format!("failed to build lexicon: {e}"))
            })?;
        Ok(Self { automaton })
    }

    /// Number of distinct lexicon entries present as whole words
    pub(crate) fn distinct_hits(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        let mut seen = Vec::new();
        for m in self.automaton.find_iter(&lower) {
            let before = lower[..m.start()].chars().next_back();
            let after = lower[m.end()..].chars().next();
            if before.map_or(false, is_word_char) || after.map_or(false, is_word_char) {
                continue;
            }
            let id = m.pattern().as_usize();
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen.len()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
