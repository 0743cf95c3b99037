//! On-disk layout of an [`InvertedIndex`].
//!
//! An index directory holds four files:
//!
//! - `meta.json`: format version, creation time and corpus statistics
//! - `dictionary.bin`: terms in id order with their corpus counts
//! - `docs.bin`: per-document length, distinct-term count and external id
//! - `postings.bin`: one postings list per term id
//!
//! Saves write all four files into `.staging/` inside the index directory,
//! then swap them in one by one (`meta.json` leaves first and arrives last).
//! Other files in the directory are never touched. If the swap fails
//! partway, the previous files are moved back from `.previous/`.

use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::postings::{DocMeta, Posting, PostingsStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Files owned by an index directory, `meta.json` last.
const INDEX_FILES: [&str; 4] = ["dictionary.bin", "docs.bin", "postings.bin", "meta.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub num_docs: u32,
    pub num_terms: u32,
    pub total_terms: u64,
    pub avg_dl: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TermEntry {
    term: String,
    corpus_count: u64,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn in_dir(&self, dir: &Path) -> Self { Self { root: dir.to_path_buf() } }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn dictionary(&self) -> PathBuf { self.root.join("dictionary.bin") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.bin") }

    /// True if the directory looks like a saved index.
    pub fn exists(&self) -> bool { self.meta().is_file() }

    fn staging(&self) -> PathBuf { self.root.join(".staging") }
    fn backup(&self) -> PathBuf { self.root.join(".previous") }
}

fn write_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).map_err(|e| match *e {
        bincode::ErrorKind::Io(io) => Error::io(path, io),
        other => Error::encode(path, other),
    })?;
    w.flush().map_err(|e| Error::io(path, e))
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| Error::io(path, e))?;
    bincode::deserialize(&buf).map_err(|e| Error::decode(path, e))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    let json = serde_json::to_string_pretty(meta).map_err(|e| Error::encode(&path, e))?;
    fs::write(&path, json).map_err(|e| Error::io(&path, e))
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let f = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let meta: MetaFile = serde_json::from_reader(BufReader::new(f)).map_err(|e| Error::decode(&path, e))?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion { found: meta.version, expected: FORMAT_VERSION });
    }
    Ok(meta)
}

fn write_files(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    let store = index.store();
    let dictionary: Vec<TermEntry> = index
        .terms()
        .iter()
        .zip(store.corpus_counts())
        .map(|(term, &corpus_count)| TermEntry { term: term.clone(), corpus_count })
        .collect();
    write_bin(&paths.dictionary(), &dictionary)?;
    write_bin(&paths.docs(), store.documents())?;
    write_bin(&paths.postings(), store.lists())?;

    let stats = index.corpus_stats();
    let meta = MetaFile {
        version: FORMAT_VERSION,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        num_docs: stats.num_docs,
        num_terms: index.num_terms() as u32,
        total_terms: stats.total_terms,
        avg_dl: stats.avg_dl,
    };
    save_meta(paths, &meta)
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::io(dir, e)),
        _ => Ok(()),
    }
}

/// Writes `index` into `paths.root`, replacing the index files already there
/// and leaving every other file alone.
pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    save_index_with(paths, index, |from, to| fs::rename(from, to))
}

fn save_index_with<F>(paths: &IndexPaths, index: &InvertedIndex, rename: F) -> Result<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    fs::create_dir_all(&paths.root).map_err(|e| Error::io(&paths.root, e))?;
    let staging = paths.in_dir(&paths.staging());
    let backup = paths.backup();
    remove_dir_if_present(&staging.root)?;
    remove_dir_if_present(&backup)?;
    fs::create_dir(&staging.root).map_err(|e| Error::io(&staging.root, e))?;

    let result = write_files(&staging, index).and_then(|()| swap_in(paths, &staging.root, &backup, rename));
    let _ = fs::remove_dir_all(&staging.root);
    if let Err(e) = result {
        // only empty once every previous file went back
        let _ = fs::remove_dir(&backup);
        return Err(e);
    }
    let _ = fs::remove_dir_all(&backup);

    tracing::info!(path = %paths.root.display(), num_docs = index.corpus_stats().num_docs, "index saved");
    Ok(())
}

/// Moves the current index files into `backup` and the staged ones into
/// place. On failure the files already moved are put back.
fn swap_in<F>(paths: &IndexPaths, staging: &Path, backup: &Path, mut rename: F) -> Result<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    fs::create_dir(backup).map_err(|e| Error::io(backup, e))?;
    let mut retired: Vec<&str> = Vec::new();
    let mut installed: Vec<&str> = Vec::new();

    let mut step = || -> Result<()> {
        for name in INDEX_FILES.iter().rev() {
            let current = paths.root.join(name);
            if current.exists() {
                rename(&current, &backup.join(name)).map_err(|e| Error::io(&current, e))?;
                retired.push(*name);
            }
        }
        for name in INDEX_FILES {
            let target = paths.root.join(name);
            rename(&staging.join(name), &target).map_err(|e| Error::io(&target, e))?;
            installed.push(name);
        }
        Ok(())
    };
    let outcome = step();

    if outcome.is_err() {
        for name in &installed {
            let _ = fs::remove_file(paths.root.join(name));
        }
        for name in retired.iter().rev() {
            if let Err(e) = fs::rename(backup.join(name), paths.root.join(name)) {
                tracing::warn!(file = %name, error = %e, "could not restore previous index file");
            }
        }
    }
    outcome
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    let meta = load_meta(paths)?;
    let dictionary: Vec<TermEntry> = read_bin(&paths.dictionary())?;
    let docs: Vec<DocMeta> = read_bin(&paths.docs())?;
    let lists: Vec<Vec<Posting>> = read_bin(&paths.postings())?;

    if dictionary.len() != meta.num_terms as usize || docs.len() != meta.num_docs as usize {
        return Err(Error::Inconsistent(format!(
            "meta.json declares {} docs / {} terms, files hold {} / {}",
            meta.num_docs,
            meta.num_terms,
            docs.len(),
            dictionary.len()
        )));
    }
    if lists.len() != dictionary.len() {
        return Err(Error::Inconsistent(format!("{} terms but {} postings lists", dictionary.len(), lists.len())));
    }

    let (terms, counts): (Vec<String>, Vec<u64>) = dictionary.into_iter().map(|e| (e.term, e.corpus_count)).unzip();
    let store = PostingsStore::from_parts(lists, counts, docs)?;
    let index = InvertedIndex::from_parts(terms, store);

    let stats = index.corpus_stats();
    if stats.total_terms != meta.total_terms || stats.avg_dl.to_bits() != meta.avg_dl.to_bits() {
        return Err(Error::Inconsistent(format!(
            "stored statistics (total {}, avg {}) disagree with documents (total {}, avg {})",
            meta.total_terms, meta.avg_dl, stats.total_terms, stats.avg_dl
        )));
    }

    tracing::info!(path = %paths.root.display(), num_docs = stats.num_docs, num_terms = index.num_terms(), "index loaded");
    Ok(index)
}

impl InvertedIndex {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_index(&IndexPaths::new(path), self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_index(&IndexPaths::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;
    use tempfile::tempdir;

    #[test]
    fn save_replaces_previous_index() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("idx");
        InvertedIndex::build(vec![Document::new(["one"])]).unwrap().save(&root).unwrap();
        InvertedIndex::build(vec![Document::new(["two"]), Document::new(["three"])]).unwrap().save(&root).unwrap();

        let loaded = InvertedIndex::load(&root).unwrap();
        assert_eq!(loaded.corpus_stats().num_docs, 2);
        assert_eq!(loaded.term_id("one"), None);
        assert!(!root.join(".staging").exists());
        assert!(!root.join(".previous").exists());
    }

    #[test]
    fn save_leaves_other_files_alone() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("corpus.dat"), "wing lift\n").unwrap();
        fs::create_dir(dir.path().join("runs")).unwrap();
        fs::write(dir.path().join("runs").join("q1.txt"), "0 1.5\n").unwrap();

        InvertedIndex::build(vec![Document::new(["wing", "lift"])]).unwrap().save(dir.path()).unwrap();
        InvertedIndex::build(vec![Document::new(["drag"])]).unwrap().save(dir.path()).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("corpus.dat")).unwrap(), "wing lift\n");
        assert!(dir.path().join("runs").join("q1.txt").is_file());
        assert_eq!(InvertedIndex::load(dir.path()).unwrap().term_id("drag"), Some(0));
    }

    #[test]
    fn failed_swap_restores_previous_index() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        InvertedIndex::build(vec![Document::new(["old"])]).unwrap().save(dir.path()).unwrap();
        let replacement = InvertedIndex::build(vec![Document::new(["new"]), Document::new(["new"])]).unwrap();

        // four renames park the old files; fail on every step of the swap
        for fail_at in 1..=8 {
            let mut calls = 0;
            let result = save_index_with(&paths, &replacement, |from, to| {
                calls += 1;
                if calls == fail_at {
                    return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
                }
                fs::rename(from, to)
            });
            assert!(matches!(result, Err(Error::Io { .. })), "rename {fail_at}");

            let loaded = InvertedIndex::load(dir.path()).unwrap();
            assert_eq!(loaded.term_id("old"), Some(0), "rename {fail_at}");
            assert_eq!(loaded.corpus_stats().num_docs, 1);
            assert!(!paths.staging().exists());
            assert!(!paths.backup().exists());
            assert_eq!(fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "keep");
        }
    }

    #[test]
    fn failed_first_save_leaves_no_index() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("idx"));
        let index = InvertedIndex::build(vec![Document::new(["a"])]).unwrap();
        let result = save_index_with(&paths, &index, |from, to| {
            if to.ends_with("postings.bin") {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            fs::rename(from, to)
        });
        assert!(result.is_err());
        assert!(!paths.exists());
        assert!(!paths.dictionary().exists());
        assert!(!paths.staging().exists());
    }

    #[test]
    fn save_through_parent_component() {
        let dir = tempdir().unwrap();
        let dotted = dir.path().join("sub").join("..");
        InvertedIndex::build(vec![Document::new(["a", "b"])]).unwrap().save(&dotted).unwrap();
        InvertedIndex::build(vec![Document::new(["c"])]).unwrap().save(&dotted).unwrap();

        assert_eq!(InvertedIndex::load(dir.path()).unwrap().term_id("c"), Some(0));
        assert!(!dir.path().join(".staging").exists());
        assert!(!dir.path().join(".previous").exists());
    }

    #[test]
    fn unserializable_value_is_an_encode_error() {
        struct Unrepresentable;
        impl Serialize for Unrepresentable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("no binary form"))
            }
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.bin");
        match write_bin(&path, &Unrepresentable) {
            Err(Error::Encode { path: p, reason }) => {
                assert_eq!(p, path);
                assert!(reason.contains("no binary form"));
            }
            other => panic!("expected encode failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_directory_is_io_failure_with_path() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("absent");
        match InvertedIndex::load(&root) {
            Err(Error::Io { path, .. }) => assert_eq!(path, root.join("meta.json")),
            other => panic!("expected io failure, got {other:?}"),
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        InvertedIndex::build(vec![Document::new(["a"])]).unwrap().save(dir.path()).unwrap();
        let mut meta = load_meta(&paths).unwrap();
        meta.version = 99;
        fs::write(paths.meta(), serde_json::to_string(&meta).unwrap()).unwrap();
        assert!(matches!(InvertedIndex::load(dir.path()), Err(Error::UnsupportedVersion { found: 99, .. })));
    }

    #[test]
    fn corrupt_postings_are_reported() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        InvertedIndex::build(vec![Document::new(["a", "b"])]).unwrap().save(dir.path()).unwrap();
        fs::write(paths.postings(), b"\x01").unwrap();
        assert!(matches!(InvertedIndex::load(dir.path()), Err(Error::Decode { .. })));
    }
}
