//! K-gram index for wildcard terms.
//!
//! Every term is cut into overlapping k-character grams, with `$` marking the
//! start and end of the term:
//!
//! ```text
//! k = 3, "cart"  →  $ca  car  art  rt$
//! ```
//!
//! A wildcard pattern such as `ca*` is answered by intersecting the postings of
//! the grams spanning its literal parts (`$ca`), then filtering the surviving
//! terms by where the literal parts have to sit.

use crate::error::{IndexError, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const BOUNDARY: char = '$';
pub const WILDCARD: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KGramPosting {
    pub term_id: u32,
    pub term: String,
}

/// Which side of the pattern the wildcard sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardPosition {
    /// `*ing`
    Leading,
    /// `ca*`
    Trailing,
    /// `c*t`
    Inner,
}

/// A pattern with exactly one `*` and one or two literal parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    pattern: String,
    position: WildcardPosition,
    parts: Vec<String>,
}

impl WildcardPattern {
    pub fn is_wildcard(term: &str) -> bool {
        term.contains(WILDCARD)
    }

    pub fn parse(pattern: &str) -> Result<Self> {
        match pattern.matches(WILDCARD).count() {
            0 => return Err(IndexError::invalid_wildcard(pattern, "no wildcard marker")),
            1 => {}
            _ => return Err(IndexError::invalid_wildcard(pattern, "more than one wildcard marker")),
        }
        let (left, right) = pattern.split_once(WILDCARD).unwrap_or((pattern, ""));
        let (position, parts) = match (left.is_empty(), right.is_empty()) {
            (true, true) => return Err(IndexError::invalid_wildcard(pattern, "no literal part")),
            (true, false) => (WildcardPosition::Leading, vec![right.to_string()]),
            (false, true) => (WildcardPosition::Trailing, vec![left.to_string()]),
            (false, false) => (WildcardPosition::Inner, vec![left.to_string(), right.to_string()]),
        };
        Ok(Self { pattern: pattern.to_string(), position, parts })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn position(&self) -> WildcardPosition {
        self.position
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Part `i` with boundary markers where the term edge is known.
    fn anchored_part(&self, i: usize) -> String {
        let part = &self.parts[i];
        match self.position {
            WildcardPosition::Leading => format!("{part}{BOUNDARY}"),
            WildcardPosition::Trailing => format!("{BOUNDARY}{part}"),
            WildcardPosition::Inner => part.clone(),
        }
    }

    /// Positional check of a candidate term against the literal parts.
    pub fn matches(&self, term: &str) -> bool {
        match self.position {
            WildcardPosition::Leading => term.ends_with(self.parts[0].as_str()),
            WildcardPosition::Trailing => term.starts_with(self.parts[0].as_str()),
            WildcardPosition::Inner => {
                let (first, second) = (&self.parts[0], &self.parts[1]);
                let Some(at) = term.find(first.as_str()) else {
                    return false;
                };
                // at least one character between the two parts
                let mut rest = term[at + first.len()..].chars();
                rest.next().is_some() && rest.as_str().contains(second.as_str())
            }
        }
    }
}

/// Maps k-grams to the terms containing them. Term ids are private to an
/// instance; [`KGramIndex::reset`] starts a fresh id space.
#[derive(Debug, Clone)]
pub struct KGramIndex {
    k: usize,
    id2term: Vec<String>,
    term2id: HashMap<String, u32>,
    grams: HashMap<String, Vec<KGramPosting>>,
}

impl KGramIndex {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(IndexError::InvalidKGramWidth(k));
        }
        Ok(Self { k, id2term: Vec::new(), term2id: HashMap::new(), grams: HashMap::new() })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_terms(&self) -> usize {
        self.id2term.len()
    }

    pub fn num_grams(&self) -> usize {
        self.grams.len()
    }

    /// An empty index of the same width.
    pub fn reset(&self) -> Self {
        Self { k: self.k, id2term: Vec::new(), term2id: HashMap::new(), grams: HashMap::new() }
    }

    pub fn term_id(&self, term: &str) -> Option<u32> {
        self.term2id.get(term).copied()
    }

    pub fn term(&self, term_id: u32) -> Option<&str> {
        self.id2term.get(term_id as usize).map(String::as_str)
    }

    /// Leading fragment, every full window, trailing fragment.
    pub fn kgrams_of(term: &str, k: usize) -> Vec<String> {
        let chars: Vec<char> = term.chars().collect();
        let n = chars.len();
        let edge = k.saturating_sub(1).min(n);
        let mut grams = Vec::with_capacity(n + 2);

        grams.push(std::iter::once(BOUNDARY).chain(chars[..edge].iter().copied()).collect());
        if n >= k {
            grams.extend(chars.windows(k).map(|w| w.iter().collect::<String>()));
        }
        grams.push(chars[n - edge..].iter().copied().chain(std::iter::once(BOUNDARY)).collect());
        grams
    }

    /// Adds every k-gram of `term`. Known terms are ignored.
    pub fn insert(&mut self, term: &str) {
        if self.term2id.contains_key(term) {
            return;
        }
        let term_id = self.id2term.len() as u32;
        self.id2term.push(term.to_string());
        self.term2id.insert(term.to_string(), term_id);

        for gram in Self::kgrams_of(term, self.k) {
            self.grams
                .entry(gram)
                .or_default()
                .push(KGramPosting { term_id, term: term.to_string() });
        }
    }

    /// Terms containing `kgram`, one entry per term.
    pub fn postings(&self, kgram: &str) -> Vec<KGramPosting> {
        self.grams.get(kgram).map(|p| unique(p)).unwrap_or_default()
    }

    /// Case-insensitive intersection on the term string.
    pub fn intersect(p1: &[KGramPosting], p2: &[KGramPosting]) -> Vec<KGramPosting> {
        let mut a = unique(p1);
        let mut b = unique(p2);
        a.sort_by(|x, y| compare_terms(&x.term, &y.term));
        b.sort_by(|x, y| compare_terms(&x.term, &y.term));

        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match compare_terms(&a[i].term, &b[j].term) {
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

    /// Terms whose grams cover `fragment`. Fragments shorter than `k` fall back
    /// to a scan of the gram keys.
    fn spanning_postings(&self, fragment: &str, position: WildcardPosition) -> Vec<KGramPosting> {
        let chars: Vec<char> = fragment.chars().collect();
        if chars.len() >= self.k {
            let mut grams = chars.windows(self.k).map(|w| w.iter().collect::<String>());
            let Some(first) = grams.next() else {
                return Vec::new();
            };
            return grams.fold(self.postings(&first), |acc, gram| {
                if acc.is_empty() {
                    acc
                } else {
                    Self::intersect(&acc, &self.postings(&gram))
                }
            });
        }

        let covers = |gram: &str| match position {
            WildcardPosition::Trailing => gram.starts_with(fragment),
            WildcardPosition::Leading => gram.ends_with(fragment),
            WildcardPosition::Inner => gram.contains(fragment),
        };
        let merged: Vec<KGramPosting> = self
            .grams
            .iter()
            .filter(|(gram, _)| covers(gram))
            .flat_map(|(_, postings)| postings.iter().cloned())
            .collect();
        unique(&merged)
    }

    /// Terms of this index matching `pattern`, sorted.
    pub fn resolve_wildcard(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = WildcardPattern::parse(pattern)?;
        let per_part = (0..pattern.parts().len())
            .map(|i| self.spanning_postings(&pattern.anchored_part(i), pattern.position()))
            .collect();
        Ok(finish(&pattern, per_part))
    }
}

/// One k-gram index per literal-part length seen in the query's wildcard
/// patterns; each part is looked up in the index whose width equals its length.
#[derive(Debug, Clone, Default)]
pub struct WildcardResolver {
    indexes: BTreeMap<usize, KGramIndex>,
}

impl WildcardResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the indexes needed by `patterns` over `vocabulary`.
    pub fn for_patterns<'a>(
        patterns: impl IntoIterator<Item = &'a str>,
        vocabulary: &[String],
    ) -> Result<Self> {
        let mut resolver = Self::new();
        for pattern in patterns {
            let parsed = WildcardPattern::parse(pattern)?;
            for part in parsed.parts() {
                resolver.add_width(part.chars().count(), vocabulary)?;
            }
        }
        tracing::debug!(widths = ?resolver.widths(), terms = vocabulary.len(), "built k-gram indexes");
        Ok(resolver)
    }

    /// Adds a `k`-wide index over `vocabulary` unless one exists already.
    pub fn add_width(&mut self, k: usize, vocabulary: &[String]) -> Result<()> {
        if self.indexes.contains_key(&k) {
            return Ok(());
        }
        let mut index = KGramIndex::new(k)?;
        for term in vocabulary {
            index.insert(term);
        }
        self.indexes.insert(k, index);
        Ok(())
    }

    pub fn widths(&self) -> Vec<usize> {
        self.indexes.keys().copied().collect()
    }

    pub fn index(&self, k: usize) -> Option<&KGramIndex> {
        self.indexes.get(&k)
    }

    /// Literal terms matching `pattern`, sorted.
    pub fn resolve(&self, pattern: &str) -> Result<Vec<String>> {
        let parsed = WildcardPattern::parse(pattern)?;
        let mut per_part = Vec::with_capacity(parsed.parts().len());
        for (i, part) in parsed.parts().iter().enumerate() {
            let width = part.chars().count();
            let index = self
                .indexes
                .get(&width)
                .ok_or_else(|| IndexError::MissingKGramIndex { pattern: pattern.to_string(), width })?;
            per_part.push(index.spanning_postings(&parsed.anchored_part(i), parsed.position()));
        }
        let terms = finish(&parsed, per_part);
        tracing::debug!(pattern, matches = terms.len(), "resolved wildcard");
        Ok(terms)
    }
}

/// Intersects per-part candidates and applies the positional filter.
fn finish(pattern: &WildcardPattern, per_part: Vec<Vec<KGramPosting>>) -> Vec<String> {
    let mut parts = per_part.into_iter();
    let first = parts.next().unwrap_or_default();
    let candidates = parts.fold(first, |acc, next| KGramIndex::intersect(&acc, &next));

    let mut terms: Vec<String> = candidates
        .into_iter()
        .map(|p| p.term)
        .filter(|t| pattern.matches(t))
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn unique(postings: &[KGramPosting]) -> Vec<KGramPosting> {
    let mut seen = HashSet::new();
    postings.iter().filter(|p| seen.insert(p.term.as_str())).cloned().collect()
}

fn compare_terms(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
