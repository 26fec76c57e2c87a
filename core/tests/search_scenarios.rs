use hashdex_core::kgram::KGramIndex;
use hashdex_core::{
    Index, Indexer, PersistentIndex, PostingSequence, Query, QueryType, Rocchio, Searcher, StorageConfig,
    Tokenizer, WildcardResolver,
};
use proptest::prelude::*;
use tempfile::{tempdir, TempDir};

fn build(texts: &[&str]) -> (TempDir, PersistentIndex) {
    let dir = tempdir().unwrap();
    let index = PersistentIndex::create(dir.path(), StorageConfig::default()).unwrap();
    let mut indexer = Indexer::new(index, Tokenizer::default());
    for (i, text) in texts.iter().enumerate() {
        indexer.index_text(&format!("doc{i}.txt"), text);
    }
    let mut index = indexer.into_index();
    index.flush().unwrap();
    (dir, index)
}

#[test]
fn end_to_end_cat_and_dog() {
    let (_dir, index) = build(&["the cat sat", "the dog sat"]);
    let searcher = Searcher::new(&index);

    let both = searcher.search(&Query::parse("the sat"), QueryType::Intersection).unwrap();
    assert_eq!(both.doc_ids(), vec![0, 1]);

    let none = searcher.search(&Query::parse("cat dog"), QueryType::Intersection).unwrap();
    assert!(none.is_empty());

    let ranked = searcher.search(&Query::parse("cat"), QueryType::Ranked).unwrap();
    assert_eq!(ranked.doc_ids(), vec![0]);
}

#[test]
fn phrase_matches_only_in_order() {
    let (_dir, index) = build(&["a b c", "c b a"]);
    let searcher = Searcher::new(&index);
    assert_eq!(searcher.search(&Query::parse("a b"), QueryType::Phrase).unwrap().doc_ids(), vec![0]);
    assert!(searcher.search(&Query::parse("a c"), QueryType::Phrase).unwrap().is_empty());
    assert_eq!(searcher.search(&Query::parse("b a"), QueryType::Phrase).unwrap().doc_ids(), vec![1]);
}

#[test]
fn ranked_puts_fuller_matches_first() {
    let (_dir, index) = build(&[
        "rust storage engine",
        "rust compiler",
        "storage shed",
        "garden tools",
    ]);
    let ranked = Searcher::new(&index).ranked(&Query::parse("rust storage")).unwrap();
    assert_eq!(ranked[0].doc_id, 0);
    assert!(ranked[0].score > ranked[1].score);
    assert!(!ranked.iter().any(|d| d.doc_id == 3));
}

#[test]
fn kgram_index_resolves_prefix_pattern() {
    let mut kgrams = KGramIndex::new(3).unwrap();
    for term in ["cat", "car", "cart", "dog"] {
        kgrams.insert(term);
    }
    let mut hits = kgrams.resolve_wildcard("ca*").unwrap();
    hits.sort();
    assert_eq!(hits, vec!["car", "cart", "cat"]);
}

#[test]
fn wildcard_query_over_persistent_index() {
    let (_dir, index) = build(&["the cat sat", "a car parked", "the dog sat", "my cart"]);
    let vocabulary = index.vocabulary();
    let resolver = WildcardResolver::for_patterns(["ca*", "*at"], &vocabulary).unwrap();
    let searcher = Searcher::new(&index).with_resolver(&resolver);

    let hits = searcher.search(&Query::parse("ca*"), QueryType::Intersection).unwrap();
    assert_eq!(hits.doc_ids(), vec![0, 1, 3]);

    let hits = searcher.search(&Query::parse("the *at"), QueryType::Phrase).unwrap();
    assert_eq!(hits.doc_ids(), vec![0]);

    assert!(searcher.search(&Query::parse("c*r*"), QueryType::Intersection).is_err());
}

#[test]
fn feedback_expands_query_with_one_term() {
    let (_dir, index) = build(&["jaguar car engine", "jaguar cat jungle", "car engine oil", "cat food"]);
    let searcher = Searcher::new(&index);
    let mut query = Query::parse("jaguar");
    let results = searcher.ranked(&query).unwrap();
    assert_eq!(results.len(), 2);

    let added = Rocchio::default()
        .expand(&searcher, &mut query, &results, &[false, true])
        .unwrap()
        .unwrap();
    // "jungle" appears only in the relevant document
    assert_eq!(added.term, "jungle");
    assert_eq!(query.len(), 2);

    let expanded = searcher.ranked(&query).unwrap();
    assert_eq!(expanded[0].doc_id, 1);
}

proptest! {
    #[test]
    fn unique_is_idempotent(docs in prop::collection::vec((0u32..10, 0u32..50), 0..40)) {
        let seq: PostingSequence = docs
            .iter()
            .map(|(d, o)| hashdex_core::PostingRecord::new("t", *d, vec![*o]))
            .collect();
        let once = seq.unique();
        prop_assert_eq!(once.unique(), once.clone());
        prop_assert_eq!(once.len(), seq.document_frequency());
    }

    #[test]
    fn self_intersection_is_dedup(docs in prop::collection::vec(0u32..20, 1..30)) {
        let mut index = hashdex_core::InMemoryIndex::new();
        for d in &docs {
            index.insert("x", *d, vec![0]);
        }
        let searcher = Searcher::new(&index);
        let result = searcher.intersection(&Query::parse("x x")).unwrap();
        prop_assert_eq!(result.doc_ids(), index.postings("x").normalized().doc_ids());
    }
}
