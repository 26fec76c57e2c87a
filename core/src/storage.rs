//! Hash-table index on disk.
//!
//! Three files make up the index:
//!
//! ```text
//! dictionary: [flag: u32][pointer: u64][length: u32]  at hash(term), 16 bytes per slot
//! data:       posting records, appended at `free`
//! collisions: overflow chains of (term, pointer, length) triples, appended at `free_collisions`
//! ```
//!
//! Flag 0 points straight into the data file, flag 1 points at an overflow
//! record in the collision file, flag 2 (or an all-zero slot) is empty.
//! Extending a chain rewrites the whole record at a fresh offset; the old
//! bytes stay behind and are never reclaimed.

use crate::config::StorageConfig;
use crate::error::{IndexError, Result};
use crate::index::{DocumentTable, Index, InMemoryIndex};
use crate::persist::{
    load_doc_info, load_meta, load_terms, save_doc_info, save_meta, save_terms, IndexPaths, MetaFile,
};
use crate::postings::{DocId, Offset, PostingSequence};
use crate::record::SlotRef;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of one dictionary slot, and the stride between slots.
pub const ENTRY_SIZE: u64 = 16;

/// One fixed-width dictionary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    pub flag: u32,
    pub pointer: u64,
    pub length: u32,
}

impl DictEntry {
    pub const DIRECT: u32 = 0;
    pub const OVERFLOW: u32 = 1;
    pub const EMPTY: u32 = 2;

    pub const VACANT: DictEntry = DictEntry { flag: Self::EMPTY, pointer: 0, length: 0 };

    pub fn direct(pointer: u64, length: u32) -> Self {
        Self { flag: Self::DIRECT, pointer, length }
    }

    pub fn overflow(pointer: u64, length: u32) -> Self {
        Self { flag: Self::OVERFLOW, pointer, length }
    }

    /// Slots never written read back as zeroes, which count as empty too.
    pub fn is_vacant(&self) -> bool {
        (self.flag == Self::EMPTY || self.flag == Self::DIRECT) && self.pointer == 0 && self.length == 0
    }

    fn to_bytes(self) -> [u8; ENTRY_SIZE as usize] {
        let mut buf = [0u8; ENTRY_SIZE as usize];
        buf[0..4].copy_from_slice(&self.flag.to_be_bytes());
        buf[4..12].copy_from_slice(&self.pointer.to_be_bytes());
        buf[12..16].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; ENTRY_SIZE as usize]) -> Self {
        let mut flag = [0u8; 4];
        let mut pointer = [0u8; 8];
        let mut length = [0u8; 4];
        flag.copy_from_slice(&buf[0..4]);
        pointer.copy_from_slice(&buf[4..12]);
        length.copy_from_slice(&buf[12..16]);
        Self {
            flag: u32::from_be_bytes(flag),
            pointer: u64::from_be_bytes(pointer),
            length: u32::from_be_bytes(length),
        }
    }
}

/// Byte offset of `term`'s dictionary slot: djb2 over UTF-16 code units,
/// reduced modulo `table_size`, scaled by the slot stride.
pub fn slot_offset(term: &str, table_size: u64) -> u64 {
    let mut hash: i64 = 5381;
    for unit in term.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(i64::from(unit));
    }
    hash.rem_euclid(table_size as i64) as u64 * ENTRY_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotWrite {
    Direct,
    Collision,
    Chained,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub terms: usize,
    pub collisions: usize,
    pub skipped: usize,
    pub bytes: u64,
}

pub struct PersistentIndex {
    paths: IndexPaths,
    storage: StorageConfig,
    dictionary: Mutex<File>,
    data: Mutex<File>,
    collisions: Mutex<File>,
    /// First free byte in the data file.
    free: u64,
    /// First free byte in the collision file.
    free_collisions: u64,
    docs: DocumentTable,
    vocabulary: BTreeSet<String>,
    pending: InMemoryIndex,
}

impl PersistentIndex {
    /// Opens (or creates) the index under `root`, keeping anything already committed.
    /// Settings recorded in an existing `meta.json` take precedence over `storage`.
    pub fn open<P: AsRef<Path>>(root: P, storage: StorageConfig) -> Result<Self> {
        Self::open_with(root.as_ref(), storage, false)
    }

    /// Creates an empty index under `root`, truncating any previous files.
    pub fn create<P: AsRef<Path>>(root: P, storage: StorageConfig) -> Result<Self> {
        Self::open_with(root.as_ref(), storage, true)
    }

    fn open_with(root: &Path, mut storage: StorageConfig, truncate: bool) -> Result<Self> {
        if storage.table_size == 0 {
            return Err(IndexError::InvalidConfig("table_size must be positive".into()));
        }
        let paths = IndexPaths::new(root);
        std::fs::create_dir_all(&paths.root).map_err(|source| IndexError::Open { path: paths.root.clone(), source })?;

        let (docs, vocabulary) = if truncate {
            for side in [paths.doc_info(), paths.terms(), paths.meta()] {
                match std::fs::remove_file(&side) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
            (DocumentTable::new(), BTreeSet::new())
        } else {
            if let Some(meta) = load_meta(&paths)? {
                if meta.storage != storage {
                    tracing::warn!(stored = ?meta.storage, requested = ?storage, "using storage settings recorded in meta.json");
                    storage = meta.storage;
                }
            }
            (load_doc_info(&paths)?, load_terms(&paths)?.into_iter().collect())
        };

        let dictionary = open_file(paths.dictionary(), truncate)?;
        let data = open_file(paths.data(), truncate)?;
        let collisions = open_file(paths.collisions(), truncate)?;
        let free = data.metadata()?.len();
        let free_collisions = collisions.metadata()?.len();

        tracing::info!(
            root = %paths.root.display(),
            docs = docs.len(),
            terms = vocabulary.len(),
            table_size = storage.table_size,
            format = ?storage.record_format,
            "opened persistent index"
        );

        Ok(Self {
            paths,
            storage,
            dictionary: Mutex::new(dictionary),
            data: Mutex::new(data),
            collisions: Mutex::new(collisions),
            free,
            free_collisions,
            docs,
            vocabulary,
            pending: InMemoryIndex::new(),
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn num_terms(&self) -> usize {
        self.vocabulary.len()
    }

    fn slot(&self, term: &str) -> u64 {
        slot_offset(term, self.storage.table_size)
    }

    /// Writes every posting sequence of `index` to the data file and registers it
    /// in the dictionary, then rewrites the side files.
    pub fn commit(&mut self, index: InMemoryIndex) -> Result<CommitStats> {
        let (postings, docs) = index.into_parts();
        let mut terms: Vec<(String, PostingSequence)> =
            postings.into_iter().filter(|(_, seq)| !seq.is_empty()).collect();
        terms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut stats = CommitStats::default();
        for (term, seq) in terms {
            let bytes = match self.storage.record_format.encode_postings(&term, &seq) {
                Ok(bytes) => bytes,
                Err(e @ IndexError::Encoding(_)) => {
                    tracing::warn!(%term, error = %e, "skipping term");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let length = u32::try_from(bytes.len())
                .map_err(|_| IndexError::Encoding(format!("record for {term:?} exceeds 4 GiB")))?;
            let pointer = self.free;
            write_at(&self.data, pointer, &bytes)?;
            self.free += u64::from(length);
            stats.bytes += u64::from(length);

            match self.write_entry(&term, pointer, length) {
                Ok(SlotWrite::Direct) => {}
                Ok(SlotWrite::Collision) | Ok(SlotWrite::Chained) => stats.collisions += 1,
                Err(e @ IndexError::CorruptSlot { .. }) => {
                    tracing::error!(error = %e, "dictionary write skipped");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
            self.vocabulary.insert(term);
            stats.terms += 1;
        }

        self.docs.extend(docs);
        self.data.lock().flush()?;
        self.collisions.lock().flush()?;
        self.dictionary.lock().flush()?;

        let vocabulary: Vec<String> = self.vocabulary.iter().cloned().collect();
        save_doc_info(&self.paths, &self.docs)?;
        save_terms(&self.paths, &vocabulary)?;
        save_meta(&self.paths, &MetaFile::new(self.docs.len(), vocabulary.len(), self.storage.clone()))?;

        tracing::info!(
            terms = stats.terms,
            collisions = stats.collisions,
            skipped = stats.skipped,
            bytes = stats.bytes,
            "index committed"
        );
        Ok(stats)
    }

    /// Commits postings buffered through [`Index::insert`].
    pub fn flush(&mut self) -> Result<CommitStats> {
        let pending = std::mem::take(&mut self.pending);
        tracing::info!(terms = pending.num_terms(), "writing buffered postings");
        self.commit(pending)
    }

    fn write_entry(&mut self, term: &str, pointer: u64, length: u32) -> Result<SlotWrite> {
        let slot = self.slot(term);
        let existing = self.read_entry(slot)?;
        let corrupt = |state: String| IndexError::CorruptSlot { term: term.to_string(), slot, state };

        if existing.is_vacant() {
            self.write_dict(slot, DictEntry::direct(pointer, length))?;
            return Ok(SlotWrite::Direct);
        }

        match existing.flag {
            DictEntry::DIRECT => match self
                .resident_term(&existing)
                .map_err(|e| corrupt(format!("unreadable resident record: {e}")))?
            {
                Some(resident) if resident != term => {
                    let chain = [
                        SlotRef { term: resident, pointer: existing.pointer, length: existing.length },
                        SlotRef { term: term.to_string(), pointer, length },
                    ];
                    let (at, len) = self.append_collision(&chain)?;
                    self.write_dict(slot, DictEntry::overflow(at, len))?;
                    tracing::debug!(term, slot, "first collision, moved slot to overflow chain");
                    Ok(SlotWrite::Collision)
                }
                Some(_) => Err(corrupt("direct slot already holds this term".into())),
                None => Err(corrupt(format!(
                    "direct slot points outside the data file ({}+{})",
                    existing.pointer, existing.length
                ))),
            },
            DictEntry::OVERFLOW if existing.length > 0 => {
                let bytes = read_span(&self.collisions, "collisions", existing.pointer, existing.length)?
                    .ok_or_else(|| corrupt("overflow record outside the collision file".into()))?;
                let mut chain = self
                    .storage
                    .record_format
                    .decode_slots(&bytes)
                    .map_err(|e| corrupt(format!("unreadable overflow record: {e}")))?;
                if chain.iter().any(|s| s.term == term) {
                    return Err(corrupt("term already chained in this slot".into()));
                }
                chain.push(SlotRef { term: term.to_string(), pointer, length });
                let (at, len) = self.append_collision(&chain)?;
                self.write_dict(slot, DictEntry::overflow(at, len))?;
                tracing::debug!(term, slot, chain = chain.len(), "extended overflow chain");
                Ok(SlotWrite::Chained)
            }
            DictEntry::OVERFLOW => Err(corrupt("overflow slot with zero length".into())),
            flag => Err(corrupt(format!("unknown collision flag {flag}"))),
        }
    }

    /// Term stored in the data record a direct slot points at.
    fn resident_term(&self, entry: &DictEntry) -> Result<Option<String>> {
        let Some(bytes) = read_span(&self.data, "data", entry.pointer, entry.length)? else {
            return Ok(None);
        };
        let (term, _) = self.storage.record_format.decode_postings(&bytes)?;
        Ok(Some(term))
    }

    fn append_collision(&mut self, chain: &[SlotRef]) -> Result<(u64, u32)> {
        let bytes = self.storage.record_format.encode_slots(chain)?;
        let length = u32::try_from(bytes.len())
            .map_err(|_| IndexError::Encoding("collision record exceeds 4 GiB".into()))?;
        let pointer = self.free_collisions;
        write_at(&self.collisions, pointer, &bytes)?;
        self.free_collisions += u64::from(length);
        Ok((pointer, length))
    }

    fn read_entry(&self, slot: u64) -> Result<DictEntry> {
        let mut file = self.dictionary.lock();
        if slot + ENTRY_SIZE > file.metadata()?.len() {
            return Ok(DictEntry::VACANT);
        }
        let mut buf = [0u8; ENTRY_SIZE as usize];
        file.seek(SeekFrom::Start(slot))?;
        file.read_exact(&mut buf)?;
        Ok(DictEntry::from_bytes(&buf))
    }

    fn write_dict(&self, slot: u64, entry: DictEntry) -> Result<()> {
        write_at(&self.dictionary, slot, &entry.to_bytes())
    }

    /// Postings for `term` read from disk. Read failures are logged and
    /// produce an empty sequence.
    pub fn lookup(&self, term: &str) -> PostingSequence {
        match self.try_lookup(term) {
            Ok(Some(postings)) => postings,
            Ok(None) => PostingSequence::new(),
            Err(e) => {
                tracing::warn!(term, error = %e, "lookup failed");
                PostingSequence::new()
            }
        }
    }

    fn try_lookup(&self, term: &str) -> Result<Option<PostingSequence>> {
        let slot = self.slot(term);
        let entry = self.read_entry(slot)?;
        if entry.is_vacant() {
            return Ok(None);
        }
        let (pointer, length) = match entry.flag {
            DictEntry::DIRECT => (entry.pointer, entry.length),
            DictEntry::OVERFLOW => {
                let Some(bytes) = read_span(&self.collisions, "collisions", entry.pointer, entry.length)? else {
                    return Ok(None);
                };
                let chain = self.storage.record_format.decode_slots(&bytes)?;
                match chain.into_iter().find(|s| s.term == term) {
                    Some(s) => (s.pointer, s.length),
                    None => return Ok(None),
                }
            }
            flag => {
                return Err(IndexError::Decoding(format!("unknown collision flag {flag} at slot {slot}")));
            }
        };
        let Some(bytes) = read_span(&self.data, "data", pointer, length)? else {
            return Ok(None);
        };
        let (stored, postings) = self.storage.record_format.decode_postings(&bytes)?;
        if stored != term {
            // another term owns this slot directly
            return Ok(None);
        }
        Ok(Some(postings))
    }
}

impl Index for PersistentIndex {
    /// Buffers the posting; it becomes visible to lookups after [`PersistentIndex::flush`].
    fn insert(&mut self, term: &str, doc_id: DocId, offsets: Vec<Offset>) {
        self.pending.insert(term, doc_id, offsets);
    }

    fn postings(&self, term: &str) -> PostingSequence {
        self.lookup(term)
    }

    fn documents(&self) -> &DocumentTable {
        &self.docs
    }

    fn documents_mut(&mut self) -> &mut DocumentTable {
        &mut self.docs
    }

    fn vocabulary(&self) -> Vec<String> {
        self.vocabulary.iter().cloned().collect()
    }
}

fn open_file(path: PathBuf, truncate: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(&path)
        .map_err(|source| IndexError::Open { path, source })
}

fn write_at(file: &Mutex<File>, pointer: u64, bytes: &[u8]) -> Result<()> {
    let mut f = file.lock();
    f.seek(SeekFrom::Start(pointer))?;
    f.write_all(bytes)?;
    Ok(())
}

/// Reads `length` bytes at `pointer`, or `None` when the span runs past the
/// end of the file.
fn read_span(file: &Mutex<File>, name: &str, pointer: u64, length: u32) -> Result<Option<Vec<u8>>> {
    let mut f = file.lock();
    let file_len = f.metadata()?.len();
    let end = pointer.checked_add(u64::from(length));
    if end.map_or(true, |end| end > file_len) {
        tracing::warn!(file = name, pointer, length, file_len, "rejecting read past end of file");
        return Ok(None);
    }
    let mut buf = vec![0u8; length as usize];
    f.seek(SeekFrom::Start(pointer))?;
    f.read_exact(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordFormat;
    use tempfile::tempdir;

    fn tiny(table_size: u64, record_format: RecordFormat) -> StorageConfig {
        StorageConfig { table_size, record_format }
    }

    #[test]
    fn djb2_slot_matches_reference_values() {
        // 5381 * 33 + 'a'
        assert_eq!(slot_offset("a", 1_000_000), (5381 * 33 + 97) * ENTRY_SIZE);
        assert_eq!(slot_offset("", 611_953), 5381 * ENTRY_SIZE);
        assert_eq!(slot_offset("anything", 1), 0);
    }

    #[test]
    fn slot_offset_stays_in_table_for_long_terms() {
        let term = "x".repeat(200);
        let slot = slot_offset(&term, 611_953);
        assert!(slot < 611_953 * ENTRY_SIZE);
        assert_eq!(slot % ENTRY_SIZE, 0);
    }

    #[test]
    fn dict_entry_bytes_round_trip() {
        let entry = DictEntry::overflow(1 << 40, 77);
        assert_eq!(DictEntry::from_bytes(&entry.to_bytes()), entry);
        assert!(DictEntry::from_bytes(&[0u8; 16]).is_vacant());
        assert!(!DictEntry::direct(0, 5).is_vacant());
    }

    #[test]
    fn single_slot_table_chains_every_term() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), tiny(1, RecordFormat::Binary)).unwrap();
        let mut mem = InMemoryIndex::new();
        mem.insert("alpha", 0, vec![0]);
        mem.insert("beta", 1, vec![2, 3]);
        mem.insert("gamma", 0, vec![1]);
        let stats = index.commit(mem).unwrap();
        assert_eq!(stats.terms, 3);
        assert_eq!(stats.collisions, 2);

        assert_eq!(index.lookup("beta").get(0).unwrap().offsets, vec![2, 3]);
        assert_eq!(index.lookup("gamma").doc_ids(), vec![0]);
        assert!(index.lookup("delta").is_empty());
    }

    #[test]
    fn recommitting_a_term_is_reported_not_overwritten() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), StorageConfig::default()).unwrap();
        let mut first = InMemoryIndex::new();
        first.insert("cat", 0, vec![1]);
        index.commit(first).unwrap();

        let mut second = InMemoryIndex::new();
        second.insert("cat", 5, vec![9]);
        let stats = index.commit(second).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(index.lookup("cat").doc_ids(), vec![0]);
    }

    #[test]
    fn recommitting_a_chained_term_is_skipped() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), tiny(1, RecordFormat::Binary)).unwrap();
        let mut first = InMemoryIndex::new();
        first.insert("a", 0, vec![0]);
        first.insert("b", 1, vec![0]);
        index.commit(first).unwrap();

        let mut second = InMemoryIndex::new();
        second.insert("b", 7, vec![3]);
        let stats = index.commit(second).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.terms, 0);
        assert_eq!(index.lookup("b").doc_ids(), vec![1]);
        assert_eq!(index.lookup("a").doc_ids(), vec![0]);
    }

    #[test]
    fn unknown_flag_is_skipped_on_write_and_empty_on_read() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), tiny(1, RecordFormat::Binary)).unwrap();
        let mut first = InMemoryIndex::new();
        first.insert("a", 0, vec![0]);
        index.commit(first).unwrap();
        index.write_dict(0, DictEntry { flag: 7, pointer: 0, length: 5 }).unwrap();

        assert!(index.lookup("a").is_empty());
        let mut second = InMemoryIndex::new();
        second.insert("c", 2, vec![1]);
        let stats = index.commit(second).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(index.lookup("c").is_empty());
    }

    #[test]
    fn zero_length_overflow_slot_is_skipped() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), tiny(1, RecordFormat::Binary)).unwrap();
        index.write_dict(0, DictEntry::overflow(0, 0)).unwrap();

        let mut mem = InMemoryIndex::new();
        mem.insert("c", 2, vec![1]);
        let stats = index.commit(mem).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.terms, 0);
        assert!(index.lookup("c").is_empty());
    }

    #[test]
    fn direct_hit_for_another_term_is_a_miss() {
        let dir = tempdir().unwrap();
        let mut index = PersistentIndex::create(dir.path(), tiny(1, RecordFormat::Delimited)).unwrap();
        let mut mem = InMemoryIndex::new();
        mem.insert("only", 0, vec![0]);
        index.commit(mem).unwrap();
        assert!(index.lookup("other").is_empty());
        assert_eq!(index.lookup("only").len(), 1);
    }

    #[test]
    fn persistent_index_is_shareable_between_readers() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<PersistentIndex>();
    }
}
