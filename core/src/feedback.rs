//! Rocchio relevance feedback: grows a query by one term taken from the
//! documents the user marked relevant.

use crate::config::FeedbackConfig;
use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::postings::{DocId, ScoredDoc};
use crate::query::{Query, QueryTerm};
use crate::search::Searcher;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Rocchio {
    config: FeedbackConfig,
}

impl Rocchio {
    pub fn new(config: FeedbackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Appends the best new term to `query` and returns it. `relevant[i]`
    /// judges `results[i]`. Returns `None` when nothing was judged relevant or
    /// no candidate term is new.
    pub fn expand<I: Index + ?Sized>(
        &self,
        searcher: &Searcher<'_, I>,
        query: &mut Query,
        results: &[ScoredDoc],
        relevant: &[bool],
    ) -> Result<Option<QueryTerm>> {
        if results.len() != relevant.len() {
            return Err(IndexError::FeedbackMismatch { results: results.len(), judgments: relevant.len() });
        }
        let relevant_docs: Vec<DocId> = results
            .iter()
            .zip(relevant)
            .filter(|(_, r)| **r)
            .map(|(d, _)| d.doc_id)
            .collect();
        if relevant_docs.is_empty() {
            return Ok(None);
        }

        let mut weights = self.query_vector(searcher, query)?;
        let index = searcher.index();
        let share = self.config.beta / relevant_docs.len() as f64;
        for &doc_id in &relevant_docs {
            let length = index.documents().length(doc_id).unwrap_or(0);
            if length == 0 {
                continue;
            }
            for term in index.document_terms(doc_id).into_keys() {
                let postings = index.postings(&term);
                let idf = searcher.idf(&postings);
                let tf = postings.term_frequency(doc_id) as f64;
                *weights.entry(term).or_insert(0.0) += tf * idf / f64::from(length) * share;
            }
        }

        let mut ranked: Vec<(String, f64)> = weights.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let Some((term, weight)) = ranked.into_iter().find(|(t, _)| !query.contains(t)) else {
            return Ok(None);
        };
        tracing::debug!(%term, weight, relevant = relevant_docs.len(), "expanding query");
        query.push(term.clone(), weight);
        Ok(Some(QueryTerm { term, weight }))
    }

    /// Query weights scaled to unit Manhattan length, times alpha.
    fn query_vector<I: Index + ?Sized>(
        &self,
        searcher: &Searcher<'_, I>,
        query: &Query,
    ) -> Result<HashMap<String, f64>> {
        let weights = searcher.query_weights(query)?;
        let norm: f64 = weights.values().map(|w| w.abs()).sum();
        Ok(weights
            .into_iter()
            .map(|(term, w)| {
                let scaled = if norm > 0.0 { self.config.alpha * w / norm } else { 0.0 };
                (term, scaled)
            })
            .collect())
    }
}
