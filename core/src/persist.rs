use crate::config::StorageConfig;
use crate::error::{IndexError, Result};
use crate::index::DocumentTable;
use crate::postings::DocId;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
    #[serde(flatten)]
    pub storage: StorageConfig,
}

impl MetaFile {
    pub fn new(num_docs: usize, num_terms: usize, storage: StorageConfig) -> Self {
        Self {
            num_docs: num_docs as u32,
            num_terms: num_terms as u32,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: META_VERSION,
            storage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn dictionary(&self) -> PathBuf { self.root.join("dictionary") }
    pub fn data(&self) -> PathBuf { self.root.join("data") }
    pub fn collisions(&self) -> PathBuf { self.root.join("collisions") }
    pub fn doc_info(&self) -> PathBuf { self.root.join("docInfo") }
    pub fn terms(&self) -> PathBuf { self.root.join("terms") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Writes `docID;path;length` lines, one per document.
pub fn save_doc_info(paths: &IndexPaths, docs: &DocumentTable) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut w = BufWriter::new(File::create(paths.doc_info())?);
    for (doc_id, meta) in docs.iter() {
        writeln!(w, "{};{};{}", doc_id, meta.name, meta.length)?;
    }
    w.flush()?;
    Ok(())
}

/// Reads the document side file. A missing file is an empty table.
pub fn load_doc_info(paths: &IndexPaths) -> Result<DocumentTable> {
    let mut docs = DocumentTable::new();
    let f = match File::open(paths.doc_info()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(docs),
        Err(e) => return Err(e.into()),
    };
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let (doc_id, name, length) = parse_doc_line(&line)?;
        docs.insert(doc_id, name, length);
    }
    Ok(docs)
}

// Paths may contain ';', so the id is the first field and the length the last.
fn parse_doc_line(line: &str) -> Result<(DocId, &str, u32)> {
    let bad = || IndexError::Decoding(format!("malformed docInfo line: {line:?}"));
    let (id, rest) = line.split_once(';').ok_or_else(bad)?;
    let (name, length) = rest.rsplit_once(';').ok_or_else(bad)?;
    let doc_id = id.trim().parse().map_err(|_| bad())?;
    let length = length.trim().parse().map_err(|_| bad())?;
    Ok((doc_id, name, length))
}

pub fn save_terms(paths: &IndexPaths, terms: &[String]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut w = BufWriter::new(File::create(paths.terms())?);
    for term in terms {
        writeln!(w, "{term}")?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_terms(paths: &IndexPaths) -> Result<Vec<String>> {
    let mut buf = String::new();
    match File::open(paths.terms()) {
        Ok(mut f) => { f.read_to_string(&mut buf)?; }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }
    Ok(buf.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<Option<MetaFile>> {
    let mut f = match File::open(paths.meta()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(Some(meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordFormat;
    use tempfile::tempdir;

    #[test]
    fn doc_info_round_trips_paths_with_separators() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut docs = DocumentTable::new();
        docs.insert(0, "corpus/a.txt", 3);
        docs.insert(1, "corpus/odd;name.txt", 12);
        save_doc_info(&paths, &docs).unwrap();

        let text = std::fs::read_to_string(paths.doc_info()).unwrap();
        assert_eq!(text, "0;corpus/a.txt;3\n1;corpus/odd;name.txt;12\n");
        assert_eq!(load_doc_info(&paths).unwrap(), docs);
    }

    #[test]
    fn missing_side_files_load_empty() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        assert!(load_doc_info(&paths).unwrap().is_empty());
        assert!(load_terms(&paths).unwrap().is_empty());
        assert!(load_meta(&paths).unwrap().is_none());
    }

    #[test]
    fn meta_keeps_storage_settings() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let storage = StorageConfig { table_size: 101, record_format: RecordFormat::Delimited };
        save_meta(&paths, &MetaFile::new(2, 5, storage.clone())).unwrap();
        let meta = load_meta(&paths).unwrap().unwrap();
        assert_eq!(meta.storage, storage);
        assert_eq!(meta.num_terms, 5);
        assert_eq!(meta.version, META_VERSION);
    }

    #[test]
    fn malformed_doc_line_is_rejected() {
        assert!(parse_doc_line("zero;a.txt;3").is_err());
        assert!(parse_doc_line("3").is_err());
        assert_eq!(parse_doc_line("7;a;b.txt;9").unwrap(), (7, "a;b.txt", 9));
    }
}
