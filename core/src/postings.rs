//! Per-term postings lists and per-document metadata.
//!
//! Lists are kept in one vector per term id, so retrieving a term touches only
//! that term's postings. Every list is strictly ascending by document id; the
//! store rejects appends that would break that order instead of sorting.

use crate::error::{Error, Result};
use crate::{DocId, TermId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    /// Token count of the document.
    pub length: u32,
    /// Number of distinct terms in the document.
    pub distinct_terms: u32,
    /// Caller-supplied identifier, if the corpus had one.
    pub external_id: Option<String>,
}

/// Corpus-wide statistics of a single term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    /// Total occurrences across the corpus.
    pub corpus_count: u64,
    /// Number of documents containing the term.
    pub doc_count: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostingsStore {
    lists: Vec<Vec<Posting>>,
    corpus_counts: Vec<u64>,
    docs: Vec<DocMeta>,
    total_terms: u64,
}

impl PostingsStore {
    pub fn new() -> Self { Self::default() }

    /// Registers the next document. Ids are dense, so `doc_id` must equal the
    /// current document count.
    pub fn add_document(&mut self, doc_id: DocId, meta: DocMeta) -> Result<()> {
        let expected = self.docs.len() as DocId;
        if doc_id != expected {
            return Err(Error::DocumentOrder { doc_id, expected });
        }
        self.total_terms += u64::from(meta.length);
        self.docs.push(meta);
        Ok(())
    }

    /// Appends a posting to `term_id`'s list. The document must already be
    /// registered and must sort after the list's current tail.
    pub fn add_posting(&mut self, term_id: TermId, doc_id: DocId, term_freq: u32) -> Result<()> {
        if term_freq == 0 {
            return Ok(());
        }
        if doc_id as usize >= self.docs.len() {
            return Err(Error::UnknownDocument(doc_id));
        }
        let slot = term_id as usize;
        if slot >= self.lists.len() {
            self.lists.resize_with(slot + 1, Vec::new);
            self.corpus_counts.resize(slot + 1, 0);
        }
        let list = &mut self.lists[slot];
        if let Some(last) = list.last() {
            if last.doc_id >= doc_id {
                return Err(Error::OrderViolation { term_id, doc_id, last: last.doc_id });
            }
        }
        list.push(Posting { doc_id, term_freq });
        self.corpus_counts[slot] += u64::from(term_freq);
        Ok(())
    }

    /// Postings of `term_id` in ascending document order; empty if unseen.
    pub fn postings(&self, term_id: TermId) -> &[Posting] {
        self.lists.get(term_id as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn term_stats(&self, term_id: TermId) -> TermStats {
        match self.lists.get(term_id as usize) {
            Some(list) => TermStats {
                corpus_count: self.corpus_counts[term_id as usize],
                doc_count: list.len() as u32,
            },
            None => TermStats::default(),
        }
    }

    pub fn document(&self, doc_id: DocId) -> Result<&DocMeta> {
        self.docs.get(doc_id as usize).ok_or(Error::UnknownDocument(doc_id))
    }

    pub fn document_length(&self, doc_id: DocId) -> Result<u32> {
        self.document(doc_id).map(|d| d.length)
    }

    pub fn distinct_term_count(&self, doc_id: DocId) -> Result<u32> {
        self.document(doc_id).map(|d| d.distinct_terms)
    }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    pub fn total_terms(&self) -> u64 { self.total_terms }

    pub fn documents(&self) -> &[DocMeta] { &self.docs }

    pub(crate) fn lists(&self) -> &[Vec<Posting>] { &self.lists }

    pub(crate) fn corpus_counts(&self) -> &[u64] { &self.corpus_counts }

    /// Pads the term table so every id below `num_terms` has a (possibly empty) list.
    pub(crate) fn reserve_terms(&mut self, num_terms: usize) {
        if self.lists.len() < num_terms {
            self.lists.resize_with(num_terms, Vec::new);
            self.corpus_counts.resize(num_terms, 0);
        }
    }

    /// Reassembles a store from persisted parts, checking every invariant the
    /// append path would have enforced.
    pub(crate) fn from_parts(lists: Vec<Vec<Posting>>, corpus_counts: Vec<u64>, docs: Vec<DocMeta>) -> Result<Self> {
        if lists.len() != corpus_counts.len() {
            return Err(Error::Inconsistent(format!(
                "{} postings lists but {} term counts",
                lists.len(),
                corpus_counts.len()
            )));
        }
        let num_docs = docs.len() as u64;
        for (term_id, (list, &count)) in lists.iter().zip(&corpus_counts).enumerate() {
            let mut sum = 0u64;
            let mut prev: Option<DocId> = None;
            for p in list {
                if prev.is_some_and(|d| d >= p.doc_id) {
                    return Err(Error::Inconsistent(format!("postings of term {term_id} are not ascending")));
                }
                if u64::from(p.doc_id) >= num_docs {
                    return Err(Error::Inconsistent(format!("term {term_id} references unknown doc {}", p.doc_id)));
                }
                prev = Some(p.doc_id);
                sum += u64::from(p.term_freq);
            }
            if sum != count {
                return Err(Error::Inconsistent(format!("term {term_id} counts {count} occurrences, postings sum to {sum}")));
            }
        }
        let total_terms = docs.iter().map(|d| u64::from(d.length)).sum();
        Ok(Self { lists, corpus_counts, docs, total_terms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(length: u32, distinct_terms: u32) -> DocMeta {
        DocMeta { length, distinct_terms, external_id: None }
    }

    #[test]
    fn appends_keep_doc_order() {
        let mut store = PostingsStore::new();
        store.add_document(0, meta(3, 2)).unwrap();
        store.add_document(1, meta(1, 1)).unwrap();
        store.add_posting(4, 0, 2).unwrap();
        store.add_posting(4, 1, 1).unwrap();

        let ids: Vec<DocId> = store.postings(4).iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(store.term_stats(4), TermStats { corpus_count: 3, doc_count: 2 });
        assert_eq!(store.total_terms(), 4);
    }

    #[test]
    fn out_of_order_posting_is_rejected() {
        let mut store = PostingsStore::new();
        store.add_document(0, meta(1, 1)).unwrap();
        store.add_document(1, meta(1, 1)).unwrap();
        store.add_posting(0, 1, 1).unwrap();
        let err = store.add_posting(0, 0, 1).unwrap_err();
        assert!(matches!(err, Error::OrderViolation { term_id: 0, doc_id: 0, last: 1 }));
        // duplicates are out of order too
        assert!(matches!(store.add_posting(0, 1, 1), Err(Error::OrderViolation { .. })));
        assert_eq!(store.postings(0).len(), 1);
    }

    #[test]
    fn unseen_terms_are_empty_not_errors() {
        let store = PostingsStore::new();
        assert!(store.postings(17).is_empty());
        assert_eq!(store.term_stats(17), TermStats::default());
    }

    #[test]
    fn unknown_document_lookups_fail() {
        let mut store = PostingsStore::new();
        store.add_document(0, meta(5, 4)).unwrap();
        assert_eq!(store.document_length(0).unwrap(), 5);
        assert_eq!(store.distinct_term_count(0).unwrap(), 4);
        assert!(matches!(store.document_length(1), Err(Error::UnknownDocument(1))));
        assert!(matches!(store.add_posting(0, 3, 1), Err(Error::UnknownDocument(3))));
    }

    #[test]
    fn documents_must_be_dense() {
        let mut store = PostingsStore::new();
        let err = store.add_document(2, meta(1, 1)).unwrap_err();
        assert!(matches!(err, Error::DocumentOrder { doc_id: 2, expected: 0 }));
    }

    #[test]
    fn from_parts_rejects_mismatched_counts() {
        let lists = vec![vec![Posting { doc_id: 0, term_freq: 2 }]];
        let err = PostingsStore::from_parts(lists, vec![3], vec![meta(2, 1)]).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }
}
