//! Stopword set (spec §4.7's UNIGRAM filter, §8's "Stopword/blacklist"
//! property): a flat, lowercased set loaded from a configured path, one
//! word per line.

use crate::error::Result;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    pub fn empty() -> Self {
        StopwordSet { words: HashSet::new() }
    }

    pub fn from_words(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        StopwordSet { words: words.into_iter().map(|w| w.into().to_lowercase()).collect() }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let words = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_lowercase())
            .collect();
        Ok(StopwordSet { words })
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
