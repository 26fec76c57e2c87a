use crate::kgram::WildcardPattern;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Intersection,
    Phrase,
    Ranked,
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersection" | "and" => Ok(QueryType::Intersection),
            "phrase" => Ok(QueryType::Phrase),
            "ranked" => Ok(QueryType::Ranked),
            other => Err(format!("unknown query type {other:?} (expected intersection, phrase or ranked)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub term: String,
    pub weight: f64,
}

/// Ordered query terms with their weights. Duplicates are kept; ranking sums
/// their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    terms: Vec<QueryTerm>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitespace-separated, lowercased, every weight 1.0.
    pub fn parse(text: &str) -> Self {
        text.split_whitespace().map(|t| QueryTerm { term: t.to_lowercase(), weight: 1.0 }).collect()
    }

    pub fn push(&mut self, term: impl Into<String>, weight: f64) {
        self.terms.push(QueryTerm { term: term.into(), weight });
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.iter().any(|t| t.term == term)
    }

    pub fn wildcard_terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.terms.iter().map(|t| t.term.as_str()).filter(|t| WildcardPattern::is_wildcard(t))
    }

    pub fn has_wildcards(&self) -> bool {
        self.wildcard_terms().next().is_some()
    }
}

impl FromIterator<QueryTerm> for Query {
    fn from_iter<I: IntoIterator<Item = QueryTerm>>(iter: I) -> Self {
        Self { terms: iter.into_iter().collect() }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for t in &self.terms {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            f.write_str(&t.term)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lowercases_and_keeps_order() {
        let q = Query::parse("  The CAT  sat ");
        let terms: Vec<&str> = q.terms().iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["the", "cat", "sat"]);
        assert!(q.terms().iter().all(|t| t.weight == 1.0));
        assert_eq!(q.to_string(), "the cat sat");
    }

    #[test]
    fn wildcard_terms_are_detected() {
        let q = Query::parse("ca* dog");
        assert!(q.has_wildcards());
        assert_eq!(q.wildcard_terms().collect::<Vec<_>>(), vec!["ca*"]);
        assert!(!Query::parse("dog").has_wildcards());
    }

    #[test]
    fn query_type_from_str() {
        assert_eq!("Ranked".parse::<QueryType>().unwrap(), QueryType::Ranked);
        assert_eq!("phrase".parse::<QueryType>().unwrap(), QueryType::Phrase);
        assert!("fuzzy".parse::<QueryType>().is_err());
    }
}
