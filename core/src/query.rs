//! Term-at-a-time query execution with bounded top-k selection.

use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::ranking::{RankingFunction, ScoreContext};
use crate::tokenizer::tokenize;
use crate::{DocId, TermId};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// A query as a multiset of terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    counts: BTreeMap<String, u32>,
}

impl Query {
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts = BTreeMap::new();
        for t in terms {
            *counts.entry(t.into()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Tokenizes raw query text.
    pub fn parse(text: &str) -> Self { Self::from_terms(tokenize(text)) }

    /// Occurrences of `term` in the query.
    pub fn weight(&self, term: &str) -> u32 { self.counts.get(term).copied().unwrap_or(0) }

    /// Total term occurrences.
    pub fn length(&self) -> u32 { self.counts.values().sum() }

    pub fn is_empty(&self) -> bool { self.counts.is_empty() }

    pub fn terms(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(t, &c)| (t.as_str(), c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub score: f64,
}

/// Ranked results plus the number of documents that matched any query term.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub results: Vec<SearchResult>,
    pub candidates: usize,
}

type RankKey = (OrderedFloat<f64>, Reverse<DocId>);

fn rank_key(doc_id: DocId, score: f64) -> RankKey { (OrderedFloat(score), Reverse(doc_id)) }

pub struct QueryExecutor<'a> {
    index: &'a InvertedIndex,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(index: &'a InvertedIndex) -> Self { Self { index } }

    /// Scores every document sharing a term with `query` and returns the best
    /// `top_k`, by score descending then doc id ascending.
    pub fn run<R>(&self, query: &Query, ranker: &R, top_k: usize) -> Result<Vec<SearchResult>>
    where
        R: RankingFunction + ?Sized,
    {
        self.run_with_stats(query, ranker, top_k).map(|o| o.results)
    }

    pub fn run_with_stats<R>(&self, query: &Query, ranker: &R, top_k: usize) -> Result<QueryOutcome>
    where
        R: RankingFunction + ?Sized,
    {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be positive".into()));
        }
        let scores = self.accumulate(query, ranker)?;
        let candidates = scores.len();
        let results = select_top_k(scores, top_k);
        tracing::debug!(terms = query.length(), candidates, returned = results.len(), "query executed");
        Ok(QueryOutcome { results, candidates })
    }

    fn accumulate<R>(&self, query: &Query, ranker: &R) -> Result<HashMap<DocId, f64>>
    where
        R: RankingFunction + ?Sized,
    {
        let store = self.index.store();
        let corpus = self.index.corpus_stats();
        let query_length = f64::from(query.length());

        // visit terms in id order so per-document sums always add up the same way
        let mut terms: Vec<(TermId, u32)> =
            query.terms().filter_map(|(t, w)| self.index.term_id(t).map(|tid| (tid, w))).collect();
        terms.sort_unstable_by_key(|&(tid, _)| tid);

        let mut scores: HashMap<DocId, f64> = HashMap::new();
        for (term_id, weight) in terms {
            let postings = store.postings(term_id);
            if postings.is_empty() {
                continue;
            }
            let stats = store.term_stats(term_id);
            for p in postings {
                let doc = store.document(p.doc_id)?;
                let ctx = ScoreContext {
                    doc_id: p.doc_id,
                    doc_length: doc.length,
                    doc_term_count: p.term_freq,
                    doc_unique_terms: doc.distinct_terms,
                    term_id,
                    corpus_term_count: stats.corpus_count,
                    doc_count: stats.doc_count,
                    query_term_weight: f64::from(weight),
                    query_length,
                    corpus,
                };
                *scores.entry(p.doc_id).or_insert(0.0) += ranker.score_term(&ctx);
            }
        }
        Ok(scores)
    }
}

fn select_top_k(scores: HashMap<DocId, f64>, k: usize) -> Vec<SearchResult> {
    if scores.len() <= k {
        let mut all: Vec<SearchResult> = scores.into_iter().map(|(doc_id, score)| SearchResult { doc_id, score }).collect();
        all.sort_unstable_by(|a, b| rank_key(b.doc_id, b.score).cmp(&rank_key(a.doc_id, a.score)));
        return all;
    }

    // min-heap of the best k seen so far; the root is the current worst
    let mut heap: BinaryHeap<Reverse<RankKey>> = BinaryHeap::with_capacity(k + 1);
    for (doc_id, score) in scores {
        let key = rank_key(doc_id, score);
        if heap.len() < k {
            heap.push(Reverse(key));
        } else if heap.peek().is_some_and(|Reverse(worst)| key > *worst) {
            heap.pop();
            heap.push(Reverse(key));
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse((score, Reverse(doc_id)))| SearchResult { doc_id, score: score.into_inner() })
        .collect()
}
