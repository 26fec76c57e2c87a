use crate::error::Result;
use crate::index::Index;
use crate::kgram::KGramIndex;
use crate::postings::{DocId, Offset};
use crate::tokenizer::Tokenizer;
use std::collections::HashMap;

/// Feeds documents into an [`Index`]: assigns dense document ids, numbers
/// token offsets, and records each document's name and length.
pub struct Indexer<I: Index> {
    index: I,
    tokenizer: Tokenizer,
    kgrams: Option<KGramIndex>,
    next_doc: DocId,
}

impl<I: Index> Indexer<I> {
    /// Ids continue after the documents already present in `index`.
    pub fn new(index: I, tokenizer: Tokenizer) -> Self {
        let next_doc = index.documents().next_id();
        Self { index, tokenizer, kgrams: None, next_doc }
    }

    /// Also feeds every new term into a `k`-gram index.
    pub fn with_kgrams(mut self, k: usize) -> Result<Self> {
        self.kgrams = Some(KGramIndex::new(k)?);
        Ok(self)
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn kgrams(&self) -> Option<&KGramIndex> {
        self.kgrams.as_ref()
    }

    pub fn num_docs(&self) -> usize {
        self.index.documents().len()
    }

    /// Tokens keep their position in the text, so dropped stopwords still
    /// count toward phrase gaps.
    pub fn index_text(&mut self, name: &str, text: &str) -> DocId {
        let tokens: Vec<(Offset, String)> = self.tokenizer.tokens(text).with_positions().collect();
        self.index_positioned(name, tokens)
    }

    /// Indexes an already tokenized document and returns its id.
    pub fn index_tokens(&mut self, name: &str, tokens: impl IntoIterator<Item = String>) -> DocId {
        self.index_positioned(name, tokens.into_iter().enumerate().map(|(i, t)| (i as Offset, t)))
    }

    fn index_positioned(&mut self, name: &str, tokens: impl IntoIterator<Item = (Offset, String)>) -> DocId {
        let doc_id = self.next_doc;
        self.next_doc += 1;

        // offsets grouped per term, terms in first-seen order
        let mut order: Vec<(String, Vec<Offset>)> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut length: u32 = 0;
        for (offset, token) in tokens {
            match position.get(&token) {
                Some(&i) => order[i].1.push(offset),
                None => {
                    position.insert(token.clone(), order.len());
                    order.push((token, vec![offset]));
                }
            }
            length += 1;
        }

        for (term, offsets) in order {
            if let Some(kgrams) = self.kgrams.as_mut() {
                kgrams.insert(&term);
            }
            self.index.insert(&term, doc_id, offsets);
        }
        self.index.documents_mut().insert(doc_id, name, length);
        tracing::trace!(doc_id, name, length, "indexed document");
        doc_id
    }

    pub fn into_index(self) -> I {
        self.index
    }

    pub fn into_parts(self) -> (I, Option<KGramIndex>) {
        (self.index, self.kgrams)
    }
}
