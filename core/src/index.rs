use crate::error::Result;
use crate::postings::{DocMeta, Posting, PostingsStore, TermStats};
use crate::{DocId, TermId};
use std::collections::HashMap;

/// A tokenized document on its way into the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub external_id: Option<String>,
    pub tokens: Vec<String>,
}

impl Document {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { external_id: None, tokens: tokens.into_iter().map(Into::into).collect() }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorpusStats {
    pub num_docs: u32,
    pub total_terms: u64,
    /// `total_terms / num_docs`, or 0 for an empty corpus.
    pub avg_dl: f64,
}

impl CorpusStats {
    pub(crate) fn from_store(store: &PostingsStore) -> Self {
        let num_docs = store.num_docs();
        let total_terms = store.total_terms();
        let avg_dl = if num_docs == 0 { 0.0 } else { total_terms as f64 / f64::from(num_docs) };
        Self { num_docs, total_terms, avg_dl }
    }
}

/// Staging area for an index build. Nothing is visible to readers until
/// [`IndexBuilder::finish`] hands over a complete [`InvertedIndex`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dictionary: HashMap<String, TermId>,
    terms: Vec<String>,
    store: PostingsStore,
    external_ids: HashMap<String, DocId>,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    /// Ingests one document and returns the id assigned to it.
    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        let doc_id = self.store.num_docs();

        let mut tf_counts: HashMap<TermId, u32> = HashMap::new();
        for token in &doc.tokens {
            let tid = match self.dictionary.get(token.as_str()) {
                Some(&tid) => tid,
                None => {
                    let tid = self.terms.len() as TermId;
                    self.dictionary.insert(token.clone(), tid);
                    self.terms.push(token.clone());
                    tid
                }
            };
            *tf_counts.entry(tid).or_insert(0) += 1;
        }

        if let Some(ext) = &doc.external_id {
            if self.external_ids.contains_key(ext) {
                tracing::warn!(external_id = %ext, doc_id, "duplicate external id, keeping first mapping");
            } else {
                self.external_ids.insert(ext.clone(), doc_id);
            }
        }

        let meta = DocMeta {
            length: doc.tokens.len() as u32,
            distinct_terms: tf_counts.len() as u32,
            external_id: doc.external_id,
        };
        self.store.add_document(doc_id, meta)?;

        let mut counts: Vec<(TermId, u32)> = tf_counts.into_iter().collect();
        counts.sort_unstable_by_key(|&(tid, _)| tid);
        for (tid, tf) in counts {
            self.store.add_posting(tid, doc_id, tf)?;
        }
        Ok(doc_id)
    }

    pub fn num_docs(&self) -> u32 { self.store.num_docs() }

    pub fn finish(mut self) -> InvertedIndex {
        self.store.reserve_terms(self.terms.len());
        let stats = CorpusStats::from_store(&self.store);
        tracing::info!(num_docs = stats.num_docs, num_terms = self.terms.len(), avg_dl = stats.avg_dl, "index built");
        InvertedIndex {
            dictionary: self.dictionary,
            terms: self.terms,
            store: self.store,
            external_ids: self.external_ids,
            stats,
        }
    }
}

/// Read-mostly inverted index. Once built or loaded it is only mutated by
/// [`InvertedIndex::rebuild`], which needs exclusive access; shared references
/// may be queried from any number of threads.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    terms: Vec<String>,
    store: PostingsStore,
    external_ids: HashMap<String, DocId>,
    stats: CorpusStats,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Builds an index from scratch out of a document stream.
    pub fn build<I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut builder = IndexBuilder::new();
        for doc in documents {
            builder.add_document(doc)?;
        }
        Ok(builder.finish())
    }

    /// Replaces the contents of `self` with a fresh build. On failure the
    /// current contents are left untouched.
    pub fn rebuild<I>(&mut self, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = Document>,
    {
        *self = Self::build(documents)?;
        Ok(())
    }

    pub(crate) fn from_parts(terms: Vec<String>, store: PostingsStore) -> Self {
        let dictionary = terms.iter().enumerate().map(|(i, t)| (t.clone(), i as TermId)).collect();
        let external_ids = store
            .documents()
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(i, d)| d.external_id.clone().map(|e| (e, i as DocId)))
            .collect();
        let stats = CorpusStats::from_store(&store);
        Self { dictionary, terms, store, external_ids, stats }
    }

    pub fn corpus_stats(&self) -> CorpusStats { self.stats }

    /// (corpus occurrence count, document frequency) of `term`, zeros if the
    /// term never occurs.
    pub fn term_stats(&self, term: &str) -> TermStats {
        self.term_id(term).map(|tid| self.store.term_stats(tid)).unwrap_or_default()
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> { self.dictionary.get(term).copied() }

    pub fn term(&self, term_id: TermId) -> Option<&str> { self.terms.get(term_id as usize).map(String::as_str) }

    pub fn num_terms(&self) -> usize { self.terms.len() }

    pub fn postings(&self, term_id: TermId) -> &[Posting] { self.store.postings(term_id) }

    pub fn store(&self) -> &PostingsStore { &self.store }

    pub fn external_id(&self, doc_id: DocId) -> Result<Option<&str>> {
        Ok(self.store.document(doc_id)?.external_id.as_deref())
    }

    pub fn doc_id(&self, external_id: &str) -> Option<DocId> { self.external_ids.get(external_id).copied() }

    pub(crate) fn terms(&self) -> &[String] { &self.terms }
}
