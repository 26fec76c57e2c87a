use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hashdex_core::config::DEFAULT_TABLE_SIZE;
use hashdex_core::{
    FeedbackConfig, Index, Indexer, PersistentIndex, Query, QueryType, RecordFormat, Rocchio, SearchResults,
    Searcher, StorageConfig, Tokenizer, TokenizerConfig, WildcardResolver,
};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a hashed full-text index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every file under the input path
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// File with extra token patterns, one regex per line
        #[arg(long)]
        patterns: Option<PathBuf>,
        /// Record layout of the data and collision files
        #[arg(long, default_value = "binary")]
        format: RecordFormat,
        /// Number of dictionary slots
        #[arg(long, default_value_t = DEFAULT_TABLE_SIZE)]
        table_size: u64,
    },
    /// Run a query against an index
    Search {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Whitespace-separated terms; `*` marks a wildcard term
        #[arg(long)]
        query: String,
        /// intersection, phrase or ranked
        #[arg(long, default_value = "intersection")]
        mode: QueryType,
        /// Maximum number of results to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Result positions (0-based) judged relevant; runs one feedback round
        #[arg(long, value_delimiter = ',')]
        relevant: Vec<usize>,
    },
    /// List the terms matching a wildcard pattern
    Wildcard {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Pattern with a single `*`
        #[arg(long)]
        pattern: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, patterns, format, table_size } => {
            let storage = StorageConfig { table_size, record_format: format };
            let tokenizer = TokenizerConfig { patterns_file: patterns, ..TokenizerConfig::default() };
            build_index(&input, &output, storage, tokenizer)
        }
        Commands::Search { index, query, mode, limit, relevant } => search(&index, &query, mode, limit, &relevant),
        Commands::Wildcard { index, pattern } => wildcard(&index, &pattern),
    }
}

fn build_index(
    input: &Path,
    output: &Path,
    storage: StorageConfig,
    tokenizer: TokenizerConfig,
) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input path {} does not exist", input.display());
    }

    let tokenizer = Tokenizer::new(tokenizer).context("loading token patterns")?;
    let index = PersistentIndex::create(output, storage)
        .with_context(|| format!("creating index in {}", output.display()))?;
    let mut indexer = Indexer::new(index, tokenizer);

    for file in &files {
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        indexer.index_text(&file.display().to_string(), &text);
        if indexer.num_docs() % 1000 == 0 {
            tracing::info!(docs = indexer.num_docs(), "indexed documents");
        }
    }
    tracing::info!(docs = indexer.num_docs(), "ingested documents");

    let mut index = indexer.into_index();
    let stats = index.flush()?;
    println!(
        "indexed {} documents, {} terms ({} collisions, {} skipped, {} bytes) into {}",
        index.documents().len(),
        stats.terms,
        stats.collisions,
        stats.skipped,
        stats.bytes,
        output.display()
    );
    Ok(())
}

fn open(path: &Path) -> Result<PersistentIndex> {
    if !path.join("meta.json").exists() {
        bail!("no index found in {}", path.display());
    }
    PersistentIndex::open(path, StorageConfig::default())
        .with_context(|| format!("opening index in {}", path.display()))
}

fn search(path: &Path, text: &str, mode: QueryType, limit: usize, relevant: &[usize]) -> Result<()> {
    let index = open(path)?;
    let mut query = Query::parse(text);
    let resolver = WildcardResolver::for_patterns(query.wildcard_terms(), &index.vocabulary())?;
    let searcher = Searcher::new(&index).with_resolver(&resolver);

    let results = searcher.search(&query, mode)?;
    print_results(&index, &results, limit);

    if relevant.is_empty() {
        return Ok(());
    }
    let SearchResults::Ranked(ranked) = &results else {
        bail!("relevance feedback needs --mode ranked");
    };
    let shown = ranked.len().min(limit);
    let mut judgments = vec![false; shown];
    for &i in relevant {
        if i >= shown {
            bail!("result position {i} is out of range (showing {shown} results)");
        }
        judgments[i] = true;
    }

    match Rocchio::new(FeedbackConfig::default()).expand(&searcher, &mut query, &ranked[..shown], &judgments)? {
        Some(added) => {
            println!("\nadded {:?} (weight {:.4}); new query: {}", added.term, added.weight, query);
            print_results(&index, &searcher.search(&query, QueryType::Ranked)?, limit);
        }
        None => println!("\nno new term to add"),
    }
    Ok(())
}

fn print_results(index: &PersistentIndex, results: &SearchResults, limit: usize) {
    let docs = index.documents();
    let name = |doc_id| docs.name(doc_id).unwrap_or("?");
    match results {
        SearchResults::Unranked(seq) => {
            println!("{} matching documents", seq.len());
            for record in seq.iter().take(limit) {
                println!("{:>6}  {}", record.doc_id, name(record.doc_id));
            }
        }
        SearchResults::Ranked(ranked) => {
            println!("{} ranked documents", ranked.len());
            for (i, doc) in ranked.iter().take(limit).enumerate() {
                println!("{:>3}. {:>6}  {:.5}  {}", i, doc.doc_id, doc.score, name(doc.doc_id));
            }
        }
    }
}

fn wildcard(path: &Path, pattern: &str) -> Result<()> {
    let index = open(path)?;
    let resolver = WildcardResolver::for_patterns([pattern], &index.vocabulary())?;
    let terms = resolver.resolve(pattern)?;
    println!("{} terms match {pattern}", terms.len());
    for term in terms {
        println!("{term}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_takes_storage_options() {
        let cli = Cli::try_parse_from([
            "indexer", "build", "--input", "docs", "--output", "idx", "--format", "delimited", "--table-size", "101",
        ])
        .unwrap();
        match cli.command {
            Commands::Build { format, table_size, .. } => {
                assert_eq!(format, RecordFormat::Delimited);
                assert_eq!(table_size, 101);
            }
            _ => panic!("expected build"),
        }
    }

    // wildcard terms are resolved from the stored vocabulary at query time
    #[test]
    fn build_has_no_kgram_option() {
        let parsed = Cli::try_parse_from(["indexer", "build", "--input", "docs", "--output", "idx", "--kgram", "3"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn relevant_positions_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "indexer", "search", "--index", "idx", "--query", "cat", "--mode", "ranked", "--relevant", "0,2",
        ])
        .unwrap();
        match cli.command {
            Commands::Search { mode, relevant, .. } => {
                assert_eq!(mode, QueryType::Ranked);
                assert_eq!(relevant, vec![0, 2]);
            }
            _ => panic!("expected search"),
        }
    }
}
