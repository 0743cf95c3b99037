//! Inverted-index retrieval core: postings storage, pluggable term-weighting
//! functions, top-k query execution and rank-based evaluation.

pub mod batch;
pub mod error;
pub mod eval;
pub mod index;
pub mod persist;
pub mod postings;
pub mod query;
pub mod ranking;
pub mod tokenizer;

pub use batch::{BatchReport, BatchRunner, Interrupt, QueryReport};
pub use error::{Error, Result};
pub use eval::{Evaluator, Qrels, QueryId};
pub use index::{CorpusStats, Document, IndexBuilder, InvertedIndex};
pub use postings::{DocMeta, Posting, PostingsStore, TermStats};
pub use query::{Query, QueryExecutor, QueryOutcome, SearchResult};
pub use ranking::{InL2, JelinekMercer, OkapiBm25, PivotedLength, RankerConfig, RankingFunction, ScoreContext};

pub type TermId = u32;
pub type DocId = u32;
