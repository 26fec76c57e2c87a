//! Posting records and the per-term sequences built from them.
//!
//! A [`PostingSequence`] is append-only while indexing. Ordering and
//! uniqueness by document id are not enforced on insert; consumers call
//! [`PostingSequence::normalized`] (or `sorted_by_doc` + `unique`) before
//! relying on either.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub type DocId = u32;
pub type Offset = u32;

/// One occurrence fact: `term` appears in `doc_id` at `offsets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub term: String,
    pub doc_id: DocId,
    /// Token positions, strictly increasing.
    pub offsets: Vec<Offset>,
    pub score: f64,
}

impl PostingRecord {
    pub fn new(term: impl Into<String>, doc_id: DocId, offsets: Vec<Offset>) -> Self {
        Self { term: term.into(), doc_id, offsets, score: 0.0 }
    }

    /// Occurrences of the term in this record's document.
    pub fn term_frequency(&self) -> usize {
        self.offsets.len()
    }
}

/// A document together with its relevance score for a ranked query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// All postings for one term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingSequence {
    records: Vec<PostingRecord>,
}

impl PostingSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PostingRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&PostingRecord> {
        self.records.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostingRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[PostingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PostingRecord> {
        self.records
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.records.iter().map(|r| r.doc_id).collect()
    }

    /// Keeps only the first record per document id, preserving order.
    pub fn unique(&self) -> PostingSequence {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.doc_id))
            .cloned()
            .collect()
    }

    /// Stable sort by document id.
    pub fn sorted_by_doc(&self) -> PostingSequence {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.doc_id);
        PostingSequence { records }
    }

    /// Sorted by document id with one record per document: the shape the merge
    /// algorithms expect.
    pub fn normalized(&self) -> PostingSequence {
        self.sorted_by_doc().unique()
    }

    /// Number of distinct documents in the sequence.
    pub fn document_frequency(&self) -> usize {
        self.records.iter().map(|r| r.doc_id).collect::<HashSet<_>>().len()
    }

    /// Total occurrences of the term in `doc_id`, across every record for it.
    pub fn term_frequency(&self, doc_id: DocId) -> usize {
        self.records
            .iter()
            .filter(|r| r.doc_id == doc_id)
            .map(PostingRecord::term_frequency)
            .sum()
    }

    /// Union of several sequences under a single `term` label: one record per
    /// document, in document order, with the offsets of all inputs merged.
    pub fn union(term: &str, sequences: impl IntoIterator<Item = PostingSequence>) -> PostingSequence {
        let mut by_doc: BTreeMap<DocId, Vec<Offset>> = BTreeMap::new();
        for seq in sequences {
            for record in seq.records {
                by_doc.entry(record.doc_id).or_default().extend(record.offsets);
            }
        }
        by_doc
            .into_iter()
            .map(|(doc_id, mut offsets)| {
                offsets.sort_unstable();
                offsets.dedup();
                PostingRecord::new(term, doc_id, offsets)
            })
            .collect()
    }
}

impl FromIterator<PostingRecord> for PostingSequence {
    fn from_iter<I: IntoIterator<Item = PostingRecord>>(iter: I) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

impl IntoIterator for PostingSequence {
    type Item = PostingRecord;
    type IntoIter = std::vec::IntoIter<PostingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a PostingSequence {
    type Item = &'a PostingRecord;
    type IntoIter = std::slice::Iter<'a, PostingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
