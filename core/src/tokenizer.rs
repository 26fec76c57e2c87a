use crate::config::TokenizerConfig;
use crate::error::Result;
use crate::postings::Offset;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;
use std::path::Path;

/// Fallback pattern for ordinary words, tried after any pattern-file entries.
pub const WORD_PATTERN: &str = r"[\p{L}\p{N}][\p{L}\p{M}\p{N}_']*";

lazy_static! {
    static ref WORD: Regex = Regex::new(&format!("(?u){WORD_PATTERN}")).expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","did","do","does","doing","down","during",
            "each","few","for","from","further","had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself","me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very","was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Reads a patterns file: one regex per line, blank lines and `//` comments skipped.
pub fn load_patterns(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("//"))
        .map(str::to_string)
        .collect())
}

/// Splits text into normalized tokens. Special patterns (e-mail addresses,
/// URLs, numbers with separators, ...) win over the plain word pattern.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pattern: Regex,
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        let patterns = match &config.patterns_file {
            Some(path) => load_patterns(path)?,
            None => Vec::new(),
        };
        Self::with_patterns(&patterns, config)
    }

    pub fn with_patterns(patterns: &[String], config: TokenizerConfig) -> Result<Self> {
        let mut alternatives: Vec<String> = patterns.iter().map(|p| format!("(?:{p})")).collect();
        alternatives.push(format!("(?:{WORD_PATTERN})"));
        let pattern = Regex::new(&format!("(?u){}", alternatives.join("|")))?;
        tracing::debug!(extra_patterns = patterns.len(), "tokenizer ready");
        Ok(Self { pattern, config })
    }

    /// Lazily yields the tokens of `text`. Call again to restart.
    pub fn tokens<'r, 't>(&'r self, text: &'t str) -> Tokens<'r, 't> {
        Tokens { matches: self.pattern.find_iter(text), tokenizer: self, position: 0 }
    }

    fn normalize(&self, raw: &str) -> Option<String> {
        let mut token: String = raw.nfkc().collect();
        if self.config.lowercase {
            token = token.to_lowercase();
        }
        if self.config.remove_stopwords && is_stopword(&token) {
            return None;
        }
        if self.config.stem {
            token = STEMMER.stem(&token).to_string();
        }
        Some(token)
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            pattern: WORD.clone(),
            config: TokenizerConfig::default(),
        }
    }
}

/// Token stream over one text.
pub struct Tokens<'r, 't> {
    matches: regex::Matches<'r, 't>,
    tokenizer: &'r Tokenizer,
    /// Index of the next raw match, dropped stopwords included.
    position: Offset,
}

impl<'r, 't> Tokens<'r, 't> {
    /// Pairs each token with its position among all matches in the text.
    pub fn with_positions(self) -> Positioned<'r, 't> {
        Positioned(self)
    }

    fn next_positioned(&mut self) -> Option<(Offset, String)> {
        for m in self.matches.by_ref() {
            let position = self.position;
            self.position += 1;
            if let Some(token) = self.tokenizer.normalize(m.as_str()) {
                return Some((position, token));
            }
        }
        None
    }
}

impl Iterator for Tokens<'_, '_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_positioned().map(|(_, token)| token)
    }
}

pub struct Positioned<'r, 't>(Tokens<'r, 't>);

impl Iterator for Positioned<'_, '_> {
    type Item = (Offset, String);

    fn next(&mut self) -> Option<(Offset, String)> {
        self.0.next_positioned()
    }
}

/// Tokenizes `text` with the default configuration.
pub fn tokenize(text: &str) -> Vec<String> {
    Tokenizer::default().tokens(text).collect()
}
