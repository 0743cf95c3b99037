//! Relevance judgments and rank-based effectiveness metrics.
//!
//! An [`Evaluator`] keeps a running list of the average precision values it
//! has computed, so mean average precision is available at any point of a
//! batch (and survives an interrupted one).

use crate::error::{Error, Result};
use crate::query::SearchResult;
use crate::DocId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub type QueryId = u32;

/// Floor applied to average precision before taking logs in [`Evaluator::gmap`].
const GMAP_EPSILON: f64 = 1e-6;

/// Graded relevance judgments: query id -> doc id -> grade. Grades above
/// zero count as relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qrels {
    judgments: HashMap<QueryId, HashMap<DocId, u32>>,
}

impl Qrels {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, query_id: QueryId, doc_id: DocId, grade: u32) {
        self.judgments.entry(query_id).or_default().insert(doc_id, grade);
    }

    /// Reads whitespace-separated `query_id doc_id grade` lines. Blank lines
    /// and lines starting with `#` are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut qrels = Self::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line.map_err(|e| Error::io(path, e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (q, d, g) = parse_line(line).ok_or_else(|| Error::decode(path, format!("line {}: expected `query doc grade`, got {line:?}", n + 1)))?;
            qrels.insert(q, d, g);
        }
        tracing::info!(path = %path.display(), queries = qrels.judgments.len(), "relevance judgments loaded");
        Ok(qrels)
    }

    pub fn grade(&self, query_id: QueryId, doc_id: DocId) -> u32 {
        self.judgments.get(&query_id).and_then(|j| j.get(&doc_id)).copied().unwrap_or(0)
    }

    pub fn is_relevant(&self, query_id: QueryId, doc_id: DocId) -> bool { self.grade(query_id, doc_id) > 0 }

    /// Number of documents judged relevant for the query; 0 for unknown queries.
    pub fn num_relevant(&self, query_id: QueryId) -> usize {
        self.judgments.get(&query_id).map(|j| j.values().filter(|&&g| g > 0).count()).unwrap_or(0)
    }

    pub fn num_queries(&self) -> usize { self.judgments.len() }

    fn grades(&self, query_id: QueryId) -> impl Iterator<Item = u32> + '_ {
        self.judgments.get(&query_id).into_iter().flat_map(|j| j.values().copied())
    }
}

fn parse_line(line: &str) -> Option<(QueryId, DocId, u32)> {
    let mut it = line.split_whitespace();
    let q = it.next()?.parse().ok()?;
    let d = it.next()?.parse().ok()?;
    let g = it.next()?.parse().ok()?;
    if it.next().is_some() {
        return None;
    }
    Some((q, d, g))
}

impl FromIterator<(QueryId, DocId, u32)> for Qrels {
    fn from_iter<I: IntoIterator<Item = (QueryId, DocId, u32)>>(iter: I) -> Self {
        let mut qrels = Self::new();
        for (q, d, g) in iter {
            qrels.insert(q, d, g);
        }
        qrels
    }
}

#[derive(Debug, Default)]
pub struct Evaluator {
    qrels: Qrels,
    avg_precisions: Mutex<Vec<f64>>,
}

impl Evaluator {
    pub fn new(qrels: Qrels) -> Self { Self { qrels, avg_precisions: Mutex::new(Vec::new()) } }

    fn relevant_hits(&self, results: &[SearchResult], query_id: QueryId, k: usize) -> usize {
        results.iter().take(k).filter(|r| self.qrels.is_relevant(query_id, r.doc_id)).count()
    }

    /// Average precision of the first `top_k` results, normalized by the
    /// total number of relevant documents for the query. The value is
    /// recorded for [`Evaluator::map`].
    pub fn avg_p(&self, results: &[SearchResult], query_id: QueryId, top_k: usize) -> f64 {
        let total_relevant = self.qrels.num_relevant(query_id);
        let ap = if total_relevant == 0 {
            0.0
        } else {
            let mut hits = 0usize;
            let mut sum = 0.0;
            for (i, r) in results.iter().take(top_k).enumerate() {
                if self.qrels.is_relevant(query_id, r.doc_id) {
                    hits += 1;
                    sum += hits as f64 / (i + 1) as f64;
                }
            }
            sum / total_relevant as f64
        };
        self.avg_precisions.lock().push(ap);
        ap
    }

    /// Mean of every average precision recorded since the last reset.
    pub fn map(&self) -> f64 {
        let aps = self.avg_precisions.lock();
        if aps.is_empty() {
            return 0.0;
        }
        aps.iter().sum::<f64>() / aps.len() as f64
    }

    /// Geometric mean of the recorded average precisions, each floored at a
    /// small epsilon so one zero does not collapse the mean.
    pub fn gmap(&self) -> f64 {
        let aps = self.avg_precisions.lock();
        if aps.is_empty() {
            return 0.0;
        }
        let log_sum: f64 = aps.iter().map(|ap| ap.max(GMAP_EPSILON).ln()).sum();
        (log_sum / aps.len() as f64).exp()
    }

    pub fn num_recorded(&self) -> usize { self.avg_precisions.lock().len() }

    pub fn reset(&self) { self.avg_precisions.lock().clear(); }

    /// Fraction of the first `k` results (or fewer, if fewer were returned)
    /// that are relevant.
    pub fn precision(&self, results: &[SearchResult], query_id: QueryId, k: usize) -> f64 {
        let considered = results.len().min(k);
        if considered == 0 {
            return 0.0;
        }
        self.relevant_hits(results, query_id, k) as f64 / considered as f64
    }

    /// Fraction of the query's relevant documents found in the first `k` results.
    pub fn recall(&self, results: &[SearchResult], query_id: QueryId, k: usize) -> f64 {
        let total = self.qrels.num_relevant(query_id);
        if total == 0 {
            return 0.0;
        }
        self.relevant_hits(results, query_id, k) as f64 / total as f64
    }

    /// Weighted harmonic mean of precision and recall at `k`.
    pub fn f1(&self, results: &[SearchResult], query_id: QueryId, k: usize, beta: f64) -> f64 {
        let p = self.precision(results, query_id, k);
        let r = self.recall(results, query_id, k);
        let b2 = beta * beta;
        let denom = b2 * p + r;
        if denom == 0.0 {
            return 0.0;
        }
        (1.0 + b2) * p * r / denom
    }

    /// Normalized discounted cumulative gain at `k` over graded judgments.
    pub fn ndcg(&self, results: &[SearchResult], query_id: QueryId, k: usize) -> f64 {
        let gains: Vec<f64> = results.iter().take(k).map(|r| f64::from(self.qrels.grade(query_id, r.doc_id))).collect();
        let dcg = dcg_at_k(&gains, k);

        let mut ideal: Vec<f64> = self.qrels.grades(query_id).map(f64::from).collect();
        ideal.sort_by(|a, b| b.total_cmp(a));
        let idcg = dcg_at_k(&ideal, k);
        if idcg < 1e-10 {
            0.0
        } else {
            dcg / idcg
        }
    }
}

fn dcg_at_k(gains: &[f64], k: usize) -> f64 {
    gains
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &g)| g / (i as f64 + 2.0).log2())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ranked(ids: &[DocId]) -> Vec<SearchResult> {
        ids.iter().enumerate().map(|(i, &doc_id)| SearchResult { doc_id, score: 100.0 - i as f64 }).collect()
    }

    fn judged() -> Evaluator {
        Evaluator::new([(1, 10, 1), (1, 20, 2), (1, 30, 0), (2, 5, 1)].into_iter().collect())
    }

    #[test]
    fn average_precision_walks_ranks() {
        let ev = judged();
        // relevant at ranks 1 and 3: (1/1 + 2/3) / 2
        let ap = ev.avg_p(&ranked(&[10, 30, 20]), 1, 10);
        assert!((ap - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn average_precision_respects_cutoff() {
        let ev = judged();
        let ap = ev.avg_p(&ranked(&[30, 10, 20]), 1, 2);
        assert!((ap - 0.25).abs() < 1e-12);
    }

    #[test]
    fn perfect_ranking_in_any_order_scores_one() {
        let ev = judged();
        assert_eq!(ev.avg_p(&ranked(&[20, 10, 30]), 1, 10), 1.0);
        assert_eq!(ev.avg_p(&ranked(&[10, 20]), 1, 10), 1.0);
    }

    #[test]
    fn unknown_query_scores_zero_and_counts() {
        let ev = judged();
        assert_eq!(ev.avg_p(&ranked(&[1, 2, 3]), 99, 10), 0.0);
        assert_eq!(ev.num_recorded(), 1);
        assert_eq!(ev.precision(&ranked(&[1]), 99, 10), 0.0);
        assert_eq!(ev.recall(&ranked(&[1]), 99, 10), 0.0);
        assert_eq!(ev.ndcg(&ranked(&[1]), 99, 10), 0.0);
    }

    #[test]
    fn map_and_reset() {
        let ev = judged();
        assert_eq!(ev.map(), 0.0);
        ev.avg_p(&ranked(&[5]), 2, 10);
        ev.avg_p(&ranked(&[7]), 2, 10);
        assert!((ev.map() - 0.5).abs() < 1e-12);
        assert!((ev.gmap() - (1.0f64 * GMAP_EPSILON).sqrt()).abs() < 1e-12);
        ev.reset();
        assert_eq!(ev.num_recorded(), 0);
        assert_eq!(ev.map(), 0.0);
    }

    #[test]
    fn precision_recall_f1() {
        let ev = judged();
        let r = ranked(&[10, 30, 40, 20]);
        assert!((ev.precision(&r, 1, 2) - 0.5).abs() < 1e-12);
        assert!((ev.recall(&r, 1, 2) - 0.5).abs() < 1e-12);
        assert!((ev.f1(&r, 1, 2, 1.0) - 0.5).abs() < 1e-12);
        assert_eq!(ev.recall(&r, 1, 4), 1.0);
        // fewer results than k: precision over what was returned
        assert_eq!(ev.precision(&ranked(&[10]), 1, 10), 1.0);
    }

    #[test]
    fn ndcg_uses_grades() {
        let ev = judged();
        assert!((ev.ndcg(&ranked(&[20, 10]), 1, 10) - 1.0).abs() < 1e-12);
        let swapped = ev.ndcg(&ranked(&[10, 20]), 1, 10);
        let expected = (1.0 + 2.0 / 3f64.log2()) / (2.0 + 1.0 / 3f64.log2());
        assert!((swapped - expected).abs() < 1e-12);
    }

    #[test]
    fn qrels_file_parses_and_reports_bad_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# query doc grade\n1 3 1\n\n1 4 0\n2 9 2").unwrap();
        let q = Qrels::load(f.path()).unwrap();
        assert_eq!(q.num_queries(), 2);
        assert_eq!(q.num_relevant(1), 1);
        assert_eq!(q.grade(2, 9), 2);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "1 3 1\n1 x").unwrap();
        assert!(matches!(Qrels::load(bad.path()), Err(Error::Decode { .. })));
    }
}
