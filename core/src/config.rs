use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of slots in the on-disk dictionary hash table.
pub const DEFAULT_TABLE_SIZE: u64 = 611_953;

/// Default width of the k-gram index used for wildcard terms.
pub const DEFAULT_KGRAM_WIDTH: usize = 3;

/// How posting and overflow records are laid out in the data and collision files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Length-prefixed bincode records.
    #[default]
    Binary,
    /// Legacy text records: fields joined by `*`, postings terminated by `¤`.
    Delimited,
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(RecordFormat::Binary),
            "delimited" => Ok(RecordFormat::Delimited),
            other => Err(format!("unknown record format: {other}")),
        }
    }
}

/// Storage engine settings. Persisted in `meta.json` on commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub table_size: u64,
    pub record_format: RecordFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_size: DEFAULT_TABLE_SIZE,
            record_format: RecordFormat::Binary,
        }
    }
}

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    /// File with one extra token regex per line, tried before the default word pattern.
    pub patterns_file: Option<PathBuf>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            patterns_file: None,
        }
    }
}

/// Rocchio relevance feedback constants.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Weight of the original query terms, between 0 and 1.
    pub alpha: f64,
    /// Weight of the terms obtained from relevant documents.
    pub beta: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { alpha: 0.2, beta: 0.8 }
    }
}
