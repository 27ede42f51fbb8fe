use super::ReaderConfig;
use crate::{error::StepError, retry::with_retry};
use connectors::source::{QueryPage, QuerySpec};
use model::records::record::Record;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Paginated synchronous query. The next page is only fetched once every
/// buffered record has been handed out.
pub struct QueryReader {
    spec: QuerySpec,
    config: ReaderConfig,
    buffer: VecDeque<Record>,
    locator: Option<String>,
    started: bool,
    done: bool,
    pages: usize,
}

impl QueryReader {
    pub fn new(spec: QuerySpec, config: ReaderConfig) -> Self {
        QueryReader {
            spec,
            config,
            buffer: VecDeque::new(),
            locator: None,
            started: false,
            done: false,
            pages: 0,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Record>, StepError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.done {
                return Ok(None);
            }

            let page = self.fetch().await?;
            self.pages += 1;
            debug!(
                object = %self.spec.object,
                page = self.pages,
                records = page.records.len(),
                done = page.done,
                "Fetched query page"
            );

            self.buffer.extend(page.records);
            self.locator = page.next_locator;
            self.done = page.done;

            if !self.done && self.locator.is_none() {
                warn!(object = %self.spec.object, "Source reported more pages without a locator");
                self.done = true;
            }
        }
    }

    async fn fetch(&mut self) -> Result<QueryPage, StepError> {
        let source = &self.config.source;
        if !self.started {
            self.started = true;
            let spec = &self.spec;
            let page_size = self.config.settings.page_size;
            return with_retry(&self.config.retry, "query", || source.query(spec, page_size)).await;
        }

        // `next` only fetches again while a locator is known.
        let locator = self.locator.as_deref().unwrap_or_default();
        with_retry(&self.config.retry, "query_more", || source.query_more(locator)).await
    }
}
