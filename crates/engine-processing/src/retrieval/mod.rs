//! Pull-driven record sources, one per retrieval strategy.

use crate::error::StepError;
use connectors::source::{DataSource, QuerySpec};
use engine_config::settings::RetrievalSettings;
use engine_core::retry::RetryPolicy;
use model::records::record::Record;
use std::{fmt, sync::Arc};

pub mod bulk;
pub mod chunked;
pub mod query;

pub use bulk::BulkReader;
pub use chunked::ChunkedReader;
pub use query::QueryReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Paginated synchronous query.
    Query,
    /// One asynchronous bulk export.
    Bulk,
    /// Consecutive bulk exports partitioned on the identifier.
    ChunkedBulk,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Query => f.write_str("query"),
            Strategy::Bulk => f.write_str("bulk"),
            Strategy::ChunkedBulk => f.write_str("chunked-bulk"),
        }
    }
}

/// Picks the strategy for an estimated record count; unknown counts are
/// treated as the largest volume.
pub fn select_strategy(count: Option<u64>, settings: &RetrievalSettings) -> Strategy {
    match count {
        None => Strategy::ChunkedBulk,
        Some(n) if n >= settings.chunked_threshold => Strategy::ChunkedBulk,
        Some(n) if n >= settings.bulk_threshold => Strategy::Bulk,
        Some(_) => Strategy::Query,
    }
}

/// Shared inputs of every reader.
#[derive(Clone)]
pub struct ReaderConfig {
    pub source: Arc<dyn DataSource>,
    pub settings: RetrievalSettings,
    pub retry: RetryPolicy,
}

/// A finite sequence of records; `Ok(None)` marks the end of the stream.
pub enum RecordReader {
    Query(QueryReader),
    Bulk(BulkReader),
    Chunked(ChunkedReader),
}

impl RecordReader {
    pub fn new(strategy: Strategy, spec: QuerySpec, config: ReaderConfig) -> Self {
        match strategy {
            Strategy::Query => RecordReader::Query(QueryReader::new(spec, config)),
            Strategy::Bulk => RecordReader::Bulk(BulkReader::new(spec, config)),
            Strategy::ChunkedBulk => RecordReader::Chunked(ChunkedReader::new(spec, config)),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Record>, StepError> {
        match self {
            RecordReader::Query(r) => r.next().await,
            RecordReader::Bulk(r) => r.next().await,
            RecordReader::Chunked(r) => r.next().await,
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            RecordReader::Query(_) => Strategy::Query,
            RecordReader::Bulk(_) => Strategy::Bulk,
            RecordReader::Chunked(_) => Strategy::ChunkedBulk,
        }
    }
}
