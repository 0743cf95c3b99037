//! Term-weighting functions.
//!
//! The query executor calls [`RankingFunction::score_term`] once per
//! (query term, document) pair found in the postings and sums the results.
//! Anything implementing the trait can be plugged in, including plain
//! closures over [`ScoreContext`].

use crate::error::{Error, Result};
use crate::index::CorpusStats;
use crate::{DocId, TermId};
use serde::{Deserialize, Serialize};

/// Everything a ranking function may look at for one (term, document) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreContext {
    pub doc_id: DocId,
    /// Token count of the document.
    pub doc_length: u32,
    /// Occurrences of the term in the document.
    pub doc_term_count: u32,
    /// Distinct terms in the document.
    pub doc_unique_terms: u32,
    pub term_id: TermId,
    /// Occurrences of the term across the corpus.
    pub corpus_term_count: u64,
    /// Documents containing the term.
    pub doc_count: u32,
    /// Occurrences of the term in the query.
    pub query_term_weight: f64,
    /// Total term occurrences in the query.
    pub query_length: f64,
    pub corpus: CorpusStats,
}

pub trait RankingFunction: Send + Sync {
    fn score_term(&self, ctx: &ScoreContext) -> f64;
}

impl<F> RankingFunction for F
where
    F: Fn(&ScoreContext) -> f64 + Send + Sync,
{
    fn score_term(&self, ctx: &ScoreContext) -> f64 { self(ctx) }
}

fn finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidParameter { name, value, reason: "must be finite" })
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64> {
    if finite(name, value)? > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidParameter { name, value, reason: "must be > 0" })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64> {
    if finite(name, value)? >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidParameter { name, value, reason: "must be >= 0" })
    }
}

fn unit_interval(name: &'static str, value: f64, open: bool) -> Result<f64> {
    let v = finite(name, value)?;
    let ok = if open { v > 0.0 && v < 1.0 } else { (0.0..=1.0).contains(&v) };
    if ok {
        Ok(v)
    } else {
        let reason = if open { "must lie in (0, 1)" } else { "must lie in [0, 1]" };
        Err(Error::InvalidParameter { name, value, reason })
    }
}

/// Inverse document frequency with Laplace-style normalization of the
/// length-normalized term frequency (DFR InL2).
///
/// ```text
/// tfn    = tf * log2(1 + avg_dl / doc_length)
/// middle = tfn / (tfn + c)
/// idf    = log2((num_docs + 1) / (corpus_term_count + 0.5))
/// score  = query_term_weight * middle * idf
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InL2 {
    c: f64,
}

impl InL2 {
    pub const DEFAULT_C: f64 = 1.0;

    pub fn new(c: f64) -> Result<Self> {
        Ok(Self { c: positive("c", c)? })
    }
}

impl RankingFunction for InL2 {
    fn score_term(&self, ctx: &ScoreContext) -> f64 {
        // zero-length documents count as length 1
        let doc_length = f64::from(ctx.doc_length.max(1));
        let tfn = f64::from(ctx.doc_term_count) * (1.0 + ctx.corpus.avg_dl / doc_length).log2();
        let middle = tfn / (tfn + self.c);
        let idf = ((f64::from(ctx.corpus.num_docs) + 1.0) / (ctx.corpus_term_count as f64 + 0.5)).log2();
        ctx.query_term_weight * middle * idf
    }
}

/// Okapi BM25 with query-term saturation `k3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OkapiBm25 {
    k1: f64,
    b: f64,
    k3: f64,
}

impl OkapiBm25 {
    pub const DEFAULT_K1: f64 = 1.2;
    pub const DEFAULT_B: f64 = 0.75;
    pub const DEFAULT_K3: f64 = 500.0;

    pub fn new(k1: f64, b: f64, k3: f64) -> Result<Self> {
        Ok(Self { k1: non_negative("k1", k1)?, b: unit_interval("b", b, false)?, k3: non_negative("k3", k3)? })
    }
}

impl Default for OkapiBm25 {
    fn default() -> Self { Self { k1: Self::DEFAULT_K1, b: Self::DEFAULT_B, k3: Self::DEFAULT_K3 } }
}

impl RankingFunction for OkapiBm25 {
    fn score_term(&self, ctx: &ScoreContext) -> f64 {
        let n = f64::from(ctx.corpus.num_docs);
        let df = f64::from(ctx.doc_count);
        let tf = f64::from(ctx.doc_term_count);
        let avg_dl = if ctx.corpus.avg_dl > 0.0 { ctx.corpus.avg_dl } else { 1.0 };

        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
        let norm = self.k1 * ((1.0 - self.b) + self.b * f64::from(ctx.doc_length) / avg_dl);
        let tf_part = ((self.k1 + 1.0) * tf) / (norm + tf);
        let qtf = ((self.k3 + 1.0) * ctx.query_term_weight) / (self.k3 + ctx.query_term_weight);
        tf_part * idf * qtf
    }
}

/// Pivoted document-length normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotedLength {
    s: f64,
}

impl PivotedLength {
    pub const DEFAULT_S: f64 = 0.2;

    pub fn new(s: f64) -> Result<Self> {
        Ok(Self { s: unit_interval("s", s, false)? })
    }
}

impl RankingFunction for PivotedLength {
    fn score_term(&self, ctx: &ScoreContext) -> f64 {
        let avg_dl = if ctx.corpus.avg_dl > 0.0 { ctx.corpus.avg_dl } else { 1.0 };
        let tf = 1.0 + (1.0 + f64::from(ctx.doc_term_count).ln()).ln();
        let norm = (1.0 - self.s) + self.s * f64::from(ctx.doc_length) / avg_dl;
        let idf = ((f64::from(ctx.corpus.num_docs) + 1.0) / (f64::from(ctx.doc_count) + 0.5)).ln();
        ctx.query_term_weight * tf / norm * idf
    }
}

/// Query likelihood with Jelinek-Mercer smoothing, in its rank-equivalent
/// per-term form (the document-independent constant is dropped).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JelinekMercer {
    lambda: f64,
}

impl JelinekMercer {
    pub const DEFAULT_LAMBDA: f64 = 0.7;

    pub fn new(lambda: f64) -> Result<Self> {
        Ok(Self { lambda: unit_interval("lambda", lambda, true)? })
    }
}

impl RankingFunction for JelinekMercer {
    fn score_term(&self, ctx: &ScoreContext) -> f64 {
        if ctx.doc_length == 0 || ctx.corpus.total_terms == 0 || ctx.corpus_term_count == 0 {
            return 0.0;
        }
        let p_collection = ctx.corpus_term_count as f64 / ctx.corpus.total_terms as f64;
        let p_doc = f64::from(ctx.doc_term_count) / f64::from(ctx.doc_length);
        ctx.query_term_weight * (1.0 + (1.0 - self.lambda) / self.lambda * p_doc / p_collection).ln()
    }
}

/// Serializable choice of built-in ranking function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum RankerConfig {
    #[serde(rename = "inl2")]
    InL2 {
        #[serde(default = "default_c")]
        c: f64,
    },
    Bm25 {
        #[serde(default = "default_k1")]
        k1: f64,
        #[serde(default = "default_b")]
        b: f64,
        #[serde(default = "default_k3")]
        k3: f64,
    },
    PivotedLength {
        #[serde(default = "default_s")]
        s: f64,
    },
    JelinekMercer {
        #[serde(default = "default_lambda")]
        lambda: f64,
    },
}

fn default_c() -> f64 { InL2::DEFAULT_C }
fn default_k1() -> f64 { OkapiBm25::DEFAULT_K1 }
fn default_b() -> f64 { OkapiBm25::DEFAULT_B }
fn default_k3() -> f64 { OkapiBm25::DEFAULT_K3 }
fn default_s() -> f64 { PivotedLength::DEFAULT_S }
fn default_lambda() -> f64 { JelinekMercer::DEFAULT_LAMBDA }

impl Default for RankerConfig {
    fn default() -> Self { RankerConfig::InL2 { c: InL2::DEFAULT_C } }
}

impl RankerConfig {
    pub fn build(&self) -> Result<Box<dyn RankingFunction>> {
        Ok(match *self {
            RankerConfig::InL2 { c } => Box::new(InL2::new(c)?),
            RankerConfig::Bm25 { k1, b, k3 } => Box::new(OkapiBm25::new(k1, b, k3)?),
            RankerConfig::PivotedLength { s } => Box::new(PivotedLength::new(s)?),
            RankerConfig::JelinekMercer { lambda } => Box::new(JelinekMercer::new(lambda)?),
        })
    }
}
