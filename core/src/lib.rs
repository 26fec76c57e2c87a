//! Hashed full-text index: on-disk term dictionary, k-gram wildcard index and
//! query evaluation (boolean, phrase, tf-idf ranked, Rocchio feedback).

pub mod config;
pub mod error;
pub mod feedback;
pub mod index;
pub mod indexer;
pub mod kgram;
pub mod persist;
pub mod postings;
pub mod query;
pub mod record;
pub mod search;
pub mod storage;
pub mod tokenizer;

pub use config::{FeedbackConfig, RecordFormat, StorageConfig, TokenizerConfig};
pub use error::{IndexError, Result};
pub use feedback::Rocchio;
pub use index::{DocMeta, DocumentTable, Index, InMemoryIndex};
pub use indexer::Indexer;
pub use kgram::{KGramIndex, WildcardResolver};
pub use postings::{DocId, Offset, PostingRecord, PostingSequence, ScoredDoc};
pub use query::{Query, QueryTerm, QueryType};
pub use search::{SearchResults, Searcher};
pub use storage::{CommitStats, PersistentIndex};
pub use tokenizer::Tokenizer;
