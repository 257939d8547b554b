// src/bot/spellcheck.rs - Frequency dictionary and the correction engine built on it

use flate2::read::GzDecoder;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::DictionaryError;
use crate::types::CorrectionSuggestion;

/// Gzipped English word list shipped with the bot, one `word frequency` pair
/// per line
const BUILTIN_WORDS_GZ: &[u8] = include_bytes!("../../data/en_words.txt.gz");

/// Immutable word -> frequency table
#[derive(Debug, Clone)]
pub struct Dictionary {
    words: HashMap<String, u64>,
    alphabet: Vec<char>,
    longest_word: usize,
}

impl Dictionary {
    pub fn from_frequencies<I, S>(entries: I) -> Result<Self, DictionaryError>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut words: HashMap<String, u64> = HashMap::new();
        for (word, count) in entries {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() {
                continue;
            }
            *words.entry(word).or_insert(0) += count;
        }

        if words.is_empty() {
            return Err(DictionaryError::Empty);
        }

        let alphabet: BTreeSet<char> = words.keys().flat_map(|w| w.chars()).collect();
        let longest_word = words.keys().map(|w| w.chars().count()).max().unwrap_or(0);

        Ok(Self {
            words,
            alphabet: alphabet.into_iter().collect(),
            longest_word,
        })
    }

    /// Parse `word [frequency]` lines. Blank lines and `#` comments are skipped
    /// and a missing frequency counts as 1.
    pub fn parse_word_list(content: &str) -> Result<Self, DictionaryError> {
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let word = match parts.next() {
                Some(word) => word,
                None => continue,
            };
            let count = match parts.next() {
                Some(value) => value.parse::<u64>().map_err(|_| DictionaryError::InvalidFrequency {
                    line: index + 1,
                    value: value.to_string(),
                })?,
                None => 1,
            };
            entries.push((word, count));
        }
        Self::from_frequencies(entries)
    }

    pub fn builtin() -> Result<Self, DictionaryError> {
        let mut content = String::new();
        GzDecoder::new(BUILTIN_WORDS_GZ)
            .read_to_string(&mut content)
            .map_err(DictionaryError::Builtin)?;
        Self::parse_word_list(&content)
    }

    /// Load a dictionary file. `.json` files hold a `{ "word": frequency }`
    /// object, anything else is read as a word list.
    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let content = fs::read_to_string(path)
            .map_err(|source| DictionaryError::Read { path: path.to_path_buf(), source })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let dictionary = if is_json {
            let table: HashMap<String, u64> = serde_json::from_str(&content)
                .map_err(|source| DictionaryError::MalformedJson { path: path.to_path_buf(), source })?;
            Self::from_frequencies(table)?
        } else {
            Self::parse_word_list(&content)?
        };

        info!("Loaded dictionary with {} words from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn frequency(&self, word: &str) -> u64 {
        self.words.get(word).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Finds likely misspellings and the most probable fix for each.
///
/// Holds nothing but the dictionary, so one instance can be shared by every
/// task through an `Arc`.
pub struct SpellChecker {
    dictionary: Dictionary,
    max_distance: u8,
}

impl SpellChecker {
    pub fn new(dictionary: Dictionary) -> Self {
        Self::with_distance(dictionary, 2)
    }

    /// `max_distance` is clamped to 1..=2
    pub fn with_distance(dictionary: Dictionary, max_distance: u8) -> Self {
        Self {
            dictionary,
            max_distance: max_distance.clamp(1, 2),
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Suggestions for every unknown word that has a correction. Words the
    /// dictionary cannot place are left out entirely.
    pub fn check(&self, text: &str) -> Vec<CorrectionSuggestion> {
        let unknown = self.unknown_words(text);
        let suggestions: Vec<CorrectionSuggestion> = unknown
            .into_iter()
            .filter_map(|word| {
                let suggested = self.correction(&word)?;
                Some(CorrectionSuggestion { original_word: word, suggested_word: Some(suggested) })
            })
            .collect();

        debug!("Spellcheck found {} suggestions in: {}", suggestions.len(), text);
        suggestions
    }

    /// Lowercased whitespace tokens that are not in the dictionary, in first
    /// occurrence order without repeats. Punctuation stays attached to words.
    pub fn unknown_words(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        text.split_whitespace()
            .map(str::to_lowercase)
            .filter(|word| self.should_check(word))
            .filter(|word| !self.dictionary.contains(word))
            .filter(|word| seen.insert(word.clone()))
            .collect()
    }

    /// Most frequent known word within the configured edit distance
    pub fn correction(&self, word: &str) -> Option<String> {
        let word = word.to_lowercase();
        let candidates = self.candidates(&word)?;
        // max_by_key keeps the last of equal maxima; walking the sorted set
        // backwards makes that the alphabetically first one.
        candidates
            .into_iter()
            .rev()
            .max_by_key(|candidate| self.dictionary.frequency(candidate))
    }

    fn candidates(&self, word: &str) -> Option<BTreeSet<String>> {
        if self.dictionary.contains(word) {
            return Some(BTreeSet::from([word.to_string()]));
        }

        let first = self.edits1(word);
        let known = self.known(first.iter());
        if !known.is_empty() {
            return Some(known);
        }

        if self.max_distance >= 2 {
            let mut known = BTreeSet::new();
            for edit in &first {
                self.collect_known_edits(edit, &mut known);
            }
            if !known.is_empty() {
                return Some(known);
            }
        }

        None
    }

    fn known<'a>(&self, words: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
        words
            .filter(|word| self.dictionary.contains(word))
            .cloned()
            .collect()
    }

    /// All strings one delete, transpose, replace or insert away from `word`
    fn edits1(&self, word: &str) -> HashSet<String> {
        let chars: Vec<char> = word.chars().collect();
        let alphabet = &self.dictionary.alphabet;
        let mut edits = HashSet::new();

        for split in 0..=chars.len() {
            let (left, right) = chars.split_at(split);
            let left: String = left.iter().collect();

            if !right.is_empty() {
                edits.insert(format!("{}{}", left, right[1..].iter().collect::<String>()));
            }
            if right.len() > 1 {
                let mut swapped: String = left.clone();
                swapped.push(right[1]);
                swapped.push(right[0]);
                swapped.extend(&right[2..]);
                edits.insert(swapped);
            }
            for &c in alphabet {
                if !right.is_empty() {
                    edits.insert(format!("{}{}{}", left, c, right[1..].iter().collect::<String>()));
                }
                edits.insert(format!("{}{}{}", left, c, right.iter().collect::<String>()));
            }
        }

        edits
    }

    /// Same edits as [`SpellChecker::edits1`], but built in one scratch buffer
    /// and only kept when the dictionary knows them. The second edit round
    /// would otherwise allocate hundreds of thousands of strings per word.
    fn collect_known_edits(&self, word: &str, known: &mut BTreeSet<String>) {
        let chars: Vec<char> = word.chars().collect();
        let mut buf = String::with_capacity(word.len() + 4);
        let mut keep = |parts: &[&[char]], buf: &mut String| {
            buf.clear();
            for part in parts {
                buf.extend(part.iter());
            }
            if self.dictionary.contains(buf.as_str()) && !known.contains(buf.as_str()) {
                known.insert(buf.clone());
            }
        };

        for split in 0..=chars.len() {
            let (left, right) = chars.split_at(split);

            if !right.is_empty() {
                keep(&[left, &right[1..]], &mut buf);
            }
            if right.len() > 1 {
                keep(&[left, &[right[1], right[0]][..], &right[2..]], &mut buf);
            }
            for &c in &self.dictionary.alphabet {
                if !right.is_empty() {
                    keep(&[left, &[c][..], &right[1..]], &mut buf);
                }
                keep(&[left, &[c][..], right], &mut buf);
            }
        }
    }

    /// Lone punctuation, numbers and absurdly long tokens are never flagged
    fn should_check(&self, word: &str) -> bool {
        let mut chars = word.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_punctuation() {
                return false;
            }
        }
        if word.chars().count() > self.dictionary.longest_word + 3 {
            return false;
        }
        if word.parse::<f64>().is_ok() {
            return false;
        }
        true
    }
}

/// Join the suggestions that have a correction. `None` means there is
/// nothing worth saying.
pub fn render_suggestions(suggestions: &[CorrectionSuggestion]) -> Option<String> {
    let rendered: Vec<String> = suggestions.iter().filter_map(CorrectionSuggestion::render).collect();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(", "))
    }
}
