//! Query evaluation over any [`Index`].
//!
//! Merges work on normalized sequences (sorted by document, one record per
//! document). Wildcard terms are expanded through a [`WildcardResolver`]; the
//! expansions' postings are unioned under the pattern.

use crate::error::Result;
use crate::index::Index;
use crate::kgram::{WildcardPattern, WildcardResolver};
use crate::postings::{DocId, PostingRecord, PostingSequence, ScoredDoc};
use crate::query::{Query, QueryType};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    Unranked(PostingSequence),
    Ranked(Vec<ScoredDoc>),
}

impl SearchResults {
    pub fn doc_ids(&self) -> Vec<DocId> {
        match self {
            SearchResults::Unranked(seq) => seq.doc_ids(),
            SearchResults::Ranked(docs) => docs.iter().map(|d| d.doc_id).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SearchResults::Unranked(seq) => seq.len(),
            SearchResults::Ranked(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One distinct query term with its summed weight and postings.
#[derive(Debug, Clone)]
pub(crate) struct WeightedPostings {
    pub term: String,
    pub weight: f64,
    pub postings: PostingSequence,
}

pub struct Searcher<'a, I: Index + ?Sized> {
    index: &'a I,
    resolver: Option<&'a WildcardResolver>,
}

impl<'a, I: Index + ?Sized> Searcher<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self { index, resolver: None }
    }

    /// Uses prebuilt k-gram indexes for wildcard terms. Without one, the
    /// needed indexes are built from the vocabulary on each query.
    pub fn with_resolver(mut self, resolver: &'a WildcardResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn index(&self) -> &'a I {
        self.index
    }

    pub fn search(&self, query: &Query, kind: QueryType) -> Result<SearchResults> {
        let results = match kind {
            QueryType::Intersection => SearchResults::Unranked(self.intersection(query)?),
            QueryType::Phrase => SearchResults::Unranked(self.phrase(query)?),
            QueryType::Ranked => SearchResults::Ranked(self.ranked(query)?),
        };
        tracing::debug!(query = %query, ?kind, results = results.len(), "query evaluated");
        Ok(results)
    }

    /// Documents containing every query term.
    pub fn intersection(&self, query: &Query) -> Result<PostingSequence> {
        let lists = self.term_postings(query)?;
        if let [only] = lists.as_slice() {
            return Ok(only.unique());
        }
        let lists: Vec<PostingSequence> = lists.iter().map(PostingSequence::normalized).collect();

        let mut result: Option<PostingSequence> = None;
        for pair in lists.chunks(2) {
            let merged = pair[1..].iter().fold(pair[0].clone(), |acc, p| intersect(&acc, p));
            let next = match result {
                None => merged,
                Some(prev) => intersect(&prev, &merged),
            };
            if next.is_empty() {
                return Ok(next);
            }
            result = Some(next);
        }
        Ok(result.unwrap_or_default())
    }

    /// Documents where the query terms occur consecutively, in order. Each
    /// record carries the offsets where the phrase starts.
    pub fn phrase(&self, query: &Query) -> Result<PostingSequence> {
        let lists = self.term_postings(query)?;
        let Some((first, rest)) = lists.split_first() else {
            return Ok(PostingSequence::new());
        };
        if rest.is_empty() {
            return Ok(first.unique());
        }
        let mut base = first.normalized();
        for (i, next) in rest.iter().enumerate() {
            base = positional_intersect(&base, &next.normalized(), i as u32 + 1);
            if base.is_empty() {
                break;
            }
        }
        Ok(base)
    }

    /// tf-idf cosine ranking, best first.
    pub fn ranked(&self, query: &Query) -> Result<Vec<ScoredDoc>> {
        let weighted = self.weighted_postings(query)?;
        if let [only] = weighted.as_slice() {
            return Ok(only
                .postings
                .unique()
                .iter()
                .map(|r| ScoredDoc { doc_id: r.doc_id, score: 0.0 })
                .collect());
        }

        let docs = self.index.documents();
        let mut scores: BTreeMap<DocId, f64> = BTreeMap::new();
        for wp in &weighted {
            let idf = self.idf(&wp.postings);
            let query_weight = wp.weight * idf;
            for record in wp.postings.normalized().iter() {
                let score = scores.entry(record.doc_id).or_insert(0.0);
                let length = docs.length(record.doc_id).unwrap_or(0);
                if length == 0 {
                    continue;
                }
                let tf = wp.postings.term_frequency(record.doc_id) as f64;
                *score += tf * idf / f64::from(length) * query_weight;
            }
        }

        let mut ranked: Vec<ScoredDoc> =
            scores.into_iter().map(|(doc_id, score)| ScoredDoc { doc_id, score }).collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    /// `ln(N / df)`, or 0 for a term in no document.
    pub fn idf(&self, postings: &PostingSequence) -> f64 {
        let df = postings.document_frequency();
        let n = self.index.documents().len();
        if df == 0 || n == 0 {
            return 0.0;
        }
        (n as f64 / df as f64).ln()
    }

    /// Query-side weight of each distinct term: summed weight times idf.
    pub fn query_weights(&self, query: &Query) -> Result<BTreeMap<String, f64>> {
        Ok(self
            .weighted_postings(query)?
            .into_iter()
            .map(|wp| {
                let idf = self.idf(&wp.postings);
                (wp.term, wp.weight * idf)
            })
            .collect())
    }

    /// Postings of each query term in query order, wildcards expanded.
    fn term_postings(&self, query: &Query) -> Result<Vec<PostingSequence>> {
        let built;
        let resolver = match self.resolver {
            Some(r) => Some(r),
            None if query.has_wildcards() => {
                built = WildcardResolver::for_patterns(query.wildcard_terms(), &self.index.vocabulary())?;
                Some(&built)
            }
            None => None,
        };
        query
            .terms()
            .iter()
            .map(|t| self.lookup(&t.term, resolver))
            .collect()
    }

    /// Distinct terms in first-seen order with their weights summed.
    pub(crate) fn weighted_postings(&self, query: &Query) -> Result<Vec<WeightedPostings>> {
        let lists = self.term_postings(query)?;
        let mut weighted: Vec<WeightedPostings> = Vec::new();
        for (t, postings) in query.terms().iter().zip(lists) {
            match weighted.iter_mut().find(|w| w.term == t.term) {
                Some(w) => w.weight += t.weight,
                None => weighted.push(WeightedPostings { term: t.term.clone(), weight: t.weight, postings }),
            }
        }
        Ok(weighted)
    }

    fn lookup(&self, term: &str, resolver: Option<&WildcardResolver>) -> Result<PostingSequence> {
        match resolver {
            Some(resolver) if WildcardPattern::is_wildcard(term) => {
                let expansions = resolver.resolve(term)?;
                tracing::trace!(pattern = term, ?expansions, "expanding wildcard term");
                Ok(PostingSequence::union(term, expansions.iter().map(|t| self.index.postings(t))))
            }
            _ => Ok(self.index.postings(term)),
        }
    }
}

/// Two-pointer merge of normalized sequences on document id. Records from
/// `p1` survive.
pub fn intersect(p1: &PostingSequence, p2: &PostingSequence) -> PostingSequence {
    let (a, b) = (p1.records(), p2.records());
    let mut result = PostingSequence::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                result.push(a[i].clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    result
}

/// Keeps the offsets `o` of `base` for which `next` has `o + gap` in the same
/// document. Both inputs must be normalized.
pub fn positional_intersect(base: &PostingSequence, next: &PostingSequence, gap: u32) -> PostingSequence {
    let (a, b) = (base.records(), next.records());
    let mut result = PostingSequence::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                let offsets: Vec<u32> = a[i]
                    .offsets
                    .iter()
                    .copied()
                    .filter(|&o| o.checked_add(gap).is_some_and(|t| b[j].offsets.binary_search(&t).is_ok()))
                    .collect();
                if !offsets.is_empty() {
                    result.push(PostingRecord::new(a[i].term.clone(), a[i].doc_id, offsets));
                }
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;

    /// Indexes whitespace-split documents, offsets counted from 0.
    fn corpus(docs: &[&str]) -> InMemoryIndex {
        let mut index = InMemoryIndex::new();
        for (doc_id, text) in docs.iter().enumerate() {
            let doc_id = doc_id as DocId;
            let words: Vec<&str> = text.split_whitespace().collect();
            let mut seen: Vec<&str> = Vec::new();
            for w in &words {
                if seen.contains(w) {
                    continue;
                }
                seen.push(w);
                let offsets = words.iter().enumerate().filter(|(_, x)| *x == w).map(|(i, _)| i as u32).collect();
                index.insert(w, doc_id, offsets);
            }
            index.documents_mut().insert(doc_id, format!("doc{doc_id}"), words.len() as u32);
        }
        index
    }

    #[test]
    fn intersection_of_common_terms() {
        let index = corpus(&["the cat sat", "the dog sat"]);
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.intersection(&Query::parse("the sat")).unwrap().doc_ids(), vec![0, 1]);
        assert!(searcher.intersection(&Query::parse("cat dog")).unwrap().is_empty());
    }

    #[test]
    fn intersection_folds_odd_term_last() {
        let index = corpus(&["a b c", "a b", "a c", "a b c d"]);
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.intersection(&Query::parse("a b c")).unwrap().doc_ids(), vec![0, 3]);
        assert_eq!(searcher.intersection(&Query::parse("a b c d")).unwrap().doc_ids(), vec![3]);
    }

    #[test]
    fn intersection_with_itself_is_unique() {
        let mut index = InMemoryIndex::new();
        index.insert("x", 2, vec![0]);
        index.insert("x", 0, vec![1]);
        index.insert("x", 2, vec![4]);
        let searcher = Searcher::new(&index);
        let result = searcher.intersection(&Query::parse("x x")).unwrap();
        assert_eq!(result.doc_ids(), index.postings("x").normalized().doc_ids());
    }

    #[test]
    fn phrase_requires_adjacent_terms() {
        let index = corpus(&["a b c", "b a c"]);
        let searcher = Searcher::new(&index);
        let hits = searcher.phrase(&Query::parse("a b")).unwrap();
        assert_eq!(hits.doc_ids(), vec![0]);
        assert_eq!(hits.get(0).unwrap().offsets, vec![0]);
        assert_eq!(searcher.phrase(&Query::parse("a c")).unwrap().doc_ids(), vec![1]);
        assert_eq!(searcher.phrase(&Query::parse("a b c")).unwrap().doc_ids(), vec![0]);
    }

    #[test]
    fn phrase_keeps_every_start_offset() {
        let index = corpus(&["to be or not to be"]);
        let hits = Searcher::new(&index).phrase(&Query::parse("to be")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.get(0).unwrap().offsets, vec![0, 4]);
    }

    #[test]
    fn ranked_single_term_keeps_posting_order() {
        let index = corpus(&["the cat sat", "the dog sat", "cat cat"]);
        let ranked = Searcher::new(&index).ranked(&Query::parse("cat")).unwrap();
        assert_eq!(ranked.iter().map(|d| d.doc_id).collect::<Vec<_>>(), vec![0, 2]);
        assert!(ranked.iter().all(|d| d.score == 0.0));
    }

    #[test]
    fn ranked_prefers_documents_with_more_query_terms() {
        let index = corpus(&["cat dog", "cat bird", "fish", "dog eel"]);
        let ranked = Searcher::new(&index).ranked(&Query::parse("cat dog")).unwrap();
        assert_eq!(ranked[0].doc_id, 0);
        assert!(ranked[0].score > ranked[1].score);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn ranked_ties_keep_document_order() {
        let index = corpus(&["x a", "x b", "y"]);
        let ranked = Searcher::new(&index).ranked(&Query::parse("a b")).unwrap();
        assert_eq!(ranked.iter().map(|d| d.doc_id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn scores_in_postings_are_untouched() {
        let index = corpus(&["cat dog", "dog"]);
        Searcher::new(&index).ranked(&Query::parse("cat dog")).unwrap();
        assert!(index.postings("dog").iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn wildcard_terms_are_expanded() {
        let index = corpus(&["cat sat", "car park", "dog sat"]);
        let searcher = Searcher::new(&index);
        let hits = searcher.search(&Query::parse("ca*"), QueryType::Intersection).unwrap();
        assert_eq!(hits.doc_ids(), vec![0, 1]);
        let hits = searcher.search(&Query::parse("ca* sat"), QueryType::Intersection).unwrap();
        assert_eq!(hits.doc_ids(), vec![0]);
        assert!(searcher.search(&Query::parse("c**"), QueryType::Intersection).is_err());
    }

    #[test]
    fn empty_query_is_empty() {
        let index = corpus(&["a"]);
        let searcher = Searcher::new(&index);
        for kind in [QueryType::Intersection, QueryType::Phrase, QueryType::Ranked] {
            assert!(searcher.search(&Query::new(), kind).unwrap().is_empty());
        }
    }
}
