use super::{BulkReader, ReaderConfig};
use crate::error::StepError;
use connectors::source::QuerySpec;
use model::records::record::Record;
use tracing::info;

/// Consecutive bulk exports keyed on the identifier: each chunk asks for the
/// next `chunk_size` records after the last identifier seen. A short chunk
/// ends the sequence.
pub struct ChunkedReader {
    spec: QuerySpec,
    config: ReaderConfig,
    current: Option<BulkReader>,
    last_id: Option<String>,
    chunk: usize,
    chunk_records: usize,
    exhausted: bool,
}

impl ChunkedReader {
    pub fn new(spec: QuerySpec, config: ReaderConfig) -> Self {
        ChunkedReader {
            spec,
            config,
            current: None,
            last_id: None,
            chunk: 0,
            chunk_records: 0,
            exhausted: false,
        }
    }

    fn chunk_spec(&self) -> QuerySpec {
        self.spec
            .clone()
            .after(self.last_id.clone())
            .limit(self.config.settings.chunk_size)
    }

    pub async fn next(&mut self) -> Result<Option<Record>, StepError> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            if self.current.is_none() {
                self.chunk += 1;
                self.chunk_records = 0;
                self.current = Some(BulkReader::new(self.chunk_spec(), self.config.clone()));
            }

            let next = match self.current.as_mut() {
                Some(reader) => reader.next().await?,
                None => None,
            };

            match next {
                Some(record) => {
                    self.chunk_records += 1;
                    if let Some(id) = record.id() {
                        self.last_id = Some(id.to_string());
                    }
                    return Ok(Some(record));
                }
                None => {
                    info!(
                        object = %self.spec.object,
                        chunk = self.chunk,
                        records = self.chunk_records,
                        "Finished export chunk"
                    );
                    self.current = None;
                    if self.chunk_records < self.config.settings.chunk_size {
                        self.exhausted = true;
                    }
                }
            }
        }
    }
}
