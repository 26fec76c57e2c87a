//! Record codecs for the data and collision files.
//!
//! # Binary layout (default)
//!
//! ```text
//! data record:      bincode(TermRecord { term, postings: [StoredPosting { doc_id, score, offsets }] })
//! collision record: bincode(Vec<SlotRef { term, pointer, length }>)
//! ```
//!
//! # Delimited layout (legacy)
//!
//! ```text
//! data record:      term*doc*score*o1*o2¤term*doc*score*o1¤...
//! collision record: term*pointer*length*term*pointer*length...
//! ```
//!
//! The delimited layout cannot represent terms containing `*` or `¤`; encoding
//! such a term fails instead of producing an unreadable record.

use crate::config::RecordFormat;
use crate::error::{IndexError, Result};
use crate::postings::{DocId, Offset, PostingRecord, PostingSequence};
use serde::{Deserialize, Serialize};

pub const FIELD_DELIMITER: char = '*';
pub const RECORD_DELIMITER: char = '¤';

#[derive(Serialize, Deserialize)]
struct StoredPosting {
    doc_id: DocId,
    score: f64,
    offsets: Vec<Offset>,
}

#[derive(Serialize, Deserialize)]
struct TermRecord {
    term: String,
    postings: Vec<StoredPosting>,
}

/// One `(term, pointer, length)` triple of a collision chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub term: String,
    pub pointer: u64,
    pub length: u32,
}

impl RecordFormat {
    pub fn encode_postings(&self, term: &str, postings: &PostingSequence) -> Result<Vec<u8>> {
        match self {
            RecordFormat::Binary => {
                let record = TermRecord {
                    term: term.to_string(),
                    postings: postings
                        .iter()
                        .map(|p| StoredPosting { doc_id: p.doc_id, score: p.score, offsets: p.offsets.clone() })
                        .collect(),
                };
                Ok(bincode::serialize(&record)?)
            }
            RecordFormat::Delimited => {
                check_delimiters(term)?;
                let mut out = String::new();
                for p in postings {
                    out.push_str(term);
                    out.push(FIELD_DELIMITER);
                    out.push_str(&p.doc_id.to_string());
                    out.push(FIELD_DELIMITER);
                    out.push_str(&format!("{:?}", p.score));
                    for offset in &p.offsets {
                        out.push(FIELD_DELIMITER);
                        out.push_str(&offset.to_string());
                    }
                    out.push(RECORD_DELIMITER);
                }
                Ok(out.into_bytes())
            }
        }
    }

    /// Decodes a data record into the term it was written for and its postings.
    pub fn decode_postings(&self, bytes: &[u8]) -> Result<(String, PostingSequence)> {
        match self {
            RecordFormat::Binary => {
                let record: TermRecord = bincode::deserialize(bytes)?;
                let term = record.term;
                let postings = record
                    .postings
                    .into_iter()
                    .map(|p| PostingRecord { term: term.clone(), doc_id: p.doc_id, offsets: p.offsets, score: p.score })
                    .collect();
                Ok((term, postings))
            }
            RecordFormat::Delimited => {
                let text = utf8(bytes)?;
                let mut term = None;
                let mut postings = PostingSequence::new();
                for entry in text.split(RECORD_DELIMITER).filter(|e| !e.is_empty()) {
                    let fields: Vec<&str> = entry.split(FIELD_DELIMITER).collect();
                    if fields.len() < 3 {
                        return Err(IndexError::Decoding(format!("posting has {} fields", fields.len())));
                    }
                    let offsets = fields[3..].iter().map(|f| parse(f)).collect::<Result<Vec<Offset>>>()?;
                    let record = PostingRecord {
                        term: fields[0].to_string(),
                        doc_id: parse(fields[1])?,
                        offsets,
                        score: parse(fields[2])?,
                    };
                    term.get_or_insert_with(|| record.term.clone());
                    postings.push(record);
                }
                let term = term.ok_or_else(|| IndexError::Decoding("empty data record".into()))?;
                Ok((term, postings))
            }
        }
    }

    pub fn encode_slots(&self, slots: &[SlotRef]) -> Result<Vec<u8>> {
        match self {
            RecordFormat::Binary => Ok(bincode::serialize(slots)?),
            RecordFormat::Delimited => {
                let mut fields = Vec::with_capacity(slots.len() * 3);
                for slot in slots {
                    check_delimiters(&slot.term)?;
                    fields.push(slot.term.clone());
                    fields.push(slot.pointer.to_string());
                    fields.push(slot.length.to_string());
                }
                Ok(fields.join(&FIELD_DELIMITER.to_string()).into_bytes())
            }
        }
    }

    pub fn decode_slots(&self, bytes: &[u8]) -> Result<Vec<SlotRef>> {
        match self {
            RecordFormat::Binary => Ok(bincode::deserialize(bytes)?),
            RecordFormat::Delimited => {
                let fields: Vec<&str> = utf8(bytes)?.split(FIELD_DELIMITER).collect();
                if fields.len() % 3 != 0 {
                    return Err(IndexError::Decoding(format!(
                        "collision record has {} fields, not a multiple of 3",
                        fields.len()
                    )));
                }
                fields
                    .chunks(3)
                    .map(|c| Ok(SlotRef { term: c[0].to_string(), pointer: parse(c[1])?, length: parse(c[2])? }))
                    .collect()
            }
        }
    }
}

fn check_delimiters(term: &str) -> Result<()> {
    if term.contains(FIELD_DELIMITER) || term.contains(RECORD_DELIMITER) {
        return Err(IndexError::Encoding(format!("term {term:?} contains a record delimiter")));
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| IndexError::Decoding(e.to_string()))
}

fn parse<T: std::str::FromStr>(field: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    field.parse().map_err(|e: T::Err| IndexError::Decoding(format!("{field:?}: {e}")))
}
