//! Themed word lists rounds draw their secret word from.
//!
//! A vocabulary file is a JSON object mapping theme names to word lists:
//!
//! ```json
//! { "animal": ["cat", "zebra"], "country": ["brazil", "japan"] }
//! ```

use log::info;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("failed to read vocabulary: {0}")]
    Io(#[from] io::Error),
    #[error("invalid vocabulary JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("vocabulary has no themes")]
    NoThemes,
    #[error("theme {0:?} has no words")]
    EmptyTheme(String),
    #[error("invalid theme name {0:?}")]
    InvalidTheme(String),
    #[error("theme {0:?} is listed more than once")]
    DuplicateTheme(String),
    #[error("invalid word {word:?} in theme {theme:?}")]
    InvalidWord { theme: String, word: String },
}

/// One named category of secret words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub words: Vec<String>,
}

/// Themes in name order. Always holds at least one theme and every theme at
/// least one word.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<String>>")]
pub struct Vocabulary {
    themes: Vec<Theme>,
}

impl Vocabulary {
    pub fn new(themes: BTreeMap<String, Vec<String>>) -> Result<Self, VocabularyError> {
        if themes.is_empty() {
            return Err(VocabularyError::NoThemes);
        }

        let mut normalized = BTreeMap::new();
        for (theme, words) in themes {
            let theme = theme.trim().to_string();
            if theme.is_empty() || theme.contains(&[':', '\n', '\r'][..]) {
                return Err(VocabularyError::InvalidTheme(theme));
            }
            if normalized.contains_key(&theme) {
                return Err(VocabularyError::DuplicateTheme(theme));
            }
            if words.is_empty() {
                return Err(VocabularyError::EmptyTheme(theme));
            }

            let mut cleaned = Vec::with_capacity(words.len());
            for word in words {
                let lowered = word.trim().to_lowercase();
                if lowered.is_empty() || !lowered.chars().all(char::is_alphabetic) {
                    return Err(VocabularyError::InvalidWord { theme, word });
                }
                cleaned.push(lowered);
            }
            normalized.insert(theme, cleaned);
        }

        Ok(Self {
            themes: normalized
                .into_iter()
                .map(|(name, words)| Theme { name, words })
                .collect(),
        })
    }

    /// The word lists the server ships with.
    pub fn builtin() -> Self {
        let themes = [
            (
                "animal",
                [
                    "cat", "dog", "elephant", "giraffe", "tiger", "lion", "monkey", "zebra",
                    "bear", "panda",
                ],
            ),
            (
                "country",
                [
                    "brazil", "argentina", "canada", "japan", "germany", "france", "italy",
                    "spain", "portugal", "mexico",
                ],
            ),
            (
                "computing",
                [
                    "mouse", "keyboard", "monitor", "processor", "memory", "compiler",
                    "python", "java", "html", "javascript",
                ],
            ),
        ];

        let mut themes: Vec<Theme> = themes
            .into_iter()
            .map(|(name, words)| Theme {
                name: name.to_string(),
                words: words.into_iter().map(str::to_string).collect(),
            })
            .collect();
        themes.sort_by(|a, b| a.name.cmp(&b.name));
        Self { themes }
    }

    pub fn from_json_str(json: &str) -> Result<Self, VocabularyError> {
        let themes: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        Self::new(themes)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let vocabulary = Self::from_json_str(&fs::read_to_string(path)?)?;
        info!(
            "Loaded {} themes ({} words) from {}",
            vocabulary.theme_count(),
            vocabulary.word_count(),
            path.display()
        );
        Ok(vocabulary)
    }

    /// Picks a theme uniformly, then a word uniformly from that theme.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> (&str, &str) {
        let theme = &self.themes[rng.gen_range(0..self.themes.len())];
        let word = &theme.words[rng.gen_range(0..theme.words.len())];
        (&theme.name, word)
    }

    pub fn themes(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|theme| theme.name.as_str())
    }

    pub fn words(&self, theme: &str) -> Option<&[String]> {
        self.themes
            .iter()
            .find(|candidate| candidate.name == theme)
            .map(|found| found.words.as_slice())
    }

    pub fn theme_count(&self) -> usize {
        self.themes.len()
    }

    pub fn word_count(&self) -> usize {
        self.themes.iter().map(|theme| theme.words.len()).sum()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for Vocabulary {
    type Error = VocabularyError;

    fn try_from(themes: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        Self::new(themes)
    }
}
