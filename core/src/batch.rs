//! Runs a list of queries through the executor and the evaluator.

use crate::error::{Error, Result};
use crate::eval::{Evaluator, QueryId};
use crate::index::InvertedIndex;
use crate::query::{Query, QueryExecutor};
use crate::ranking::RankingFunction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared stop flag, checked by [`BatchRunner`] before each query.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self { Self::default() }

    pub fn trigger(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn is_triggered(&self) -> bool { self.0.load(Ordering::SeqCst) }

    /// Triggers the flag from a background thread once `budget` has elapsed.
    pub fn trigger_after(&self, budget: Duration) {
        let flag = self.clone();
        thread::spawn(move || {
            thread::sleep(budget);
            flag.trigger();
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    /// 1-based position of the query in the batch.
    pub ordinal: usize,
    pub query_id: QueryId,
    pub avg_precision: f64,
    pub precision: f64,
    pub recall: f64,
    pub ndcg: f64,
    pub returned: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub queries: Vec<QueryReport>,
    pub map: f64,
    pub gmap: f64,
    pub elapsed: Duration,
    /// True if the batch stopped early because the interrupt fired.
    pub interrupted: bool,
}

pub struct BatchRunner<'a, R: ?Sized> {
    index: &'a InvertedIndex,
    ranker: &'a R,
    evaluator: &'a Evaluator,
    top_k: usize,
    interrupt: Interrupt,
}

impl<'a, R> BatchRunner<'a, R>
where
    R: RankingFunction + ?Sized,
{
    pub fn new(index: &'a InvertedIndex, ranker: &'a R, evaluator: &'a Evaluator, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be positive".into()));
        }
        Ok(Self { index, ranker, evaluator, top_k, interrupt: Interrupt::new() })
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Runs each query in order, calling `on_query` as soon as a query has
    /// been evaluated. Average precisions accumulate in the evaluator, so the
    /// reported MAP covers everything it has recorded this session.
    pub fn run<I, F>(&self, queries: I, mut on_query: F) -> Result<BatchReport>
    where
        I: IntoIterator<Item = (QueryId, Query)>,
        F: FnMut(&QueryReport),
    {
        let start = Instant::now();
        let executor = QueryExecutor::new(self.index);
        let mut reports = Vec::new();
        let mut interrupted = false;

        for (i, (query_id, query)) in queries.into_iter().enumerate() {
            if self.interrupt.is_triggered() {
                tracing::warn!(completed = reports.len(), "batch interrupted");
                interrupted = true;
                break;
            }
            let outcome = executor.run_with_stats(&query, self.ranker, self.top_k)?;
            let results = &outcome.results;
            let report = QueryReport {
                ordinal: i + 1,
                query_id,
                avg_precision: self.evaluator.avg_p(results, query_id, self.top_k),
                precision: self.evaluator.precision(results, query_id, self.top_k),
                recall: self.evaluator.recall(results, query_id, self.top_k),
                ndcg: self.evaluator.ndcg(results, query_id, self.top_k),
                returned: results.len(),
                candidates: outcome.candidates,
            };
            tracing::debug!(query_id, ap = report.avg_precision, returned = report.returned, "query evaluated");
            on_query(&report);
            reports.push(report);
        }

        Ok(BatchReport {
            queries: reports,
            map: self.evaluator.map(),
            gmap: self.evaluator.gmap(),
            elapsed: start.elapsed(),
            interrupted,
        })
    }
}
