use crate::postings::{DocId, Offset, PostingRecord, PostingSequence};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    /// Path or name the document was loaded from.
    pub name: String,
    /// Number of tokens in the document.
    pub length: u32,
}

/// Document id → name/length, shared by every index variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTable {
    docs: BTreeMap<DocId, DocMeta>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: DocId, name: impl Into<String>, length: u32) {
        self.docs.insert(doc_id, DocMeta { name: name.into(), length });
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocMeta> {
        self.docs.get(&doc_id)
    }

    pub fn name(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(&doc_id).map(|m| m.name.as_str())
    }

    pub fn length(&self, doc_id: DocId) -> Option<u32> {
        self.docs.get(&doc_id).map(|m| m.length)
    }

    /// Corpus size N used for idf.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn next_id(&self) -> DocId {
        self.docs.keys().next_back().map_or(0, |id| id + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &DocMeta)> + '_ {
        self.docs.iter().map(|(id, meta)| (*id, meta))
    }

    pub fn extend(&mut self, other: DocumentTable) {
        self.docs.extend(other.docs);
    }
}

/// Capability shared by the in-memory and on-disk indexes. The query engine is
/// written once against this trait.
pub trait Index {
    /// Appends a posting for `term`. No ordering or dedup happens here.
    fn insert(&mut self, term: &str, doc_id: DocId, offsets: Vec<Offset>);

    /// Postings for `term`; empty when the term is unknown.
    fn postings(&self, term: &str) -> PostingSequence;

    fn documents(&self) -> &DocumentTable;

    fn documents_mut(&mut self) -> &mut DocumentTable;

    /// Every term known to the index, sorted.
    fn vocabulary(&self) -> Vec<String>;

    /// Term → posting for every term occurring in `doc_id`. Scans the whole
    /// vocabulary, so only feedback rounds should call it.
    fn document_terms(&self, doc_id: DocId) -> HashMap<String, PostingRecord> {
        let mut terms = HashMap::new();
        for term in self.vocabulary() {
            if let Some(record) = self.postings(&term).into_iter().find(|r| r.doc_id == doc_id) {
                terms.insert(term, record);
            }
        }
        terms
    }
}

/// Term → postings hash map built during indexing.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    postings: HashMap<String, PostingSequence>,
    docs: DocumentTable,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.docs.is_empty()
    }

    /// Splits the index into its term map and document table.
    pub fn into_parts(self) -> (HashMap<String, PostingSequence>, DocumentTable) {
        (self.postings, self.docs)
    }
}

impl Index for InMemoryIndex {
    fn insert(&mut self, term: &str, doc_id: DocId, offsets: Vec<Offset>) {
        self.postings
            .entry(term.to_string())
            .or_default()
            .push(PostingRecord::new(term, doc_id, offsets));
    }

    fn postings(&self, term: &str) -> PostingSequence {
        self.postings.get(term).cloned().unwrap_or_default()
    }

    fn documents(&self) -> &DocumentTable {
        &self.docs
    }

    fn documents_mut(&mut self) -> &mut DocumentTable {
        &mut self.docs
    }

    fn vocabulary(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.postings.keys().cloned().collect();
        terms.sort();
        terms
    }

    fn document_terms(&self, doc_id: DocId) -> HashMap<String, PostingRecord> {
        self.postings
            .iter()
            .filter_map(|(term, seq)| {
                seq.iter().find(|r| r.doc_id == doc_id).map(|r| (term.clone(), r.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_appends_without_dedup() {
        let mut index = InMemoryIndex::new();
        index.insert("cat", 1, vec![0]);
        index.insert("cat", 0, vec![2]);
        index.insert("cat", 1, vec![5]);
        assert_eq!(index.postings("cat").doc_ids(), vec![1, 0, 1]);
        assert!(index.postings("dog").is_empty());
    }

    #[test]
    fn document_terms_lists_terms_of_one_doc() {
        let mut index = InMemoryIndex::new();
        index.insert("cat", 0, vec![1]);
        index.insert("sat", 0, vec![2]);
        index.insert("dog", 1, vec![1]);
        let terms = index.document_terms(0);
        let mut keys: Vec<_> = terms.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["cat", "sat"]);
        assert_eq!(index.vocabulary(), vec!["cat", "dog", "sat"]);
    }

    #[test]
    fn document_table_tracks_next_id() {
        let mut docs = DocumentTable::new();
        assert_eq!(docs.next_id(), 0);
        docs.insert(0, "a.txt", 3);
        docs.insert(1, "b.txt", 5);
        assert_eq!(docs.next_id(), 2);
        assert_eq!(docs.length(1), Some(5));
        assert_eq!(docs.name(0), Some("a.txt"));
    }
}
