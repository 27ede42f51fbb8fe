use connectors::wire;
use model::records::{
    batch::Batch,
    record::{ID_FIELD, Record},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_records: usize,
    pub max_bytes: usize,
}

/// Groups records into batches bounded by record count and estimated CSV size.
///
/// The column set and header size are fixed by the first record seen. A
/// record that would make the batch reach either limit closes the current
/// batch first and then opens the next one.
pub struct BatchAccumulator {
    object: String,
    limits: BatchLimits,
    columns: Option<Vec<String>>,
    header_size: usize,
    records: Vec<Record>,
    running_size: usize,
    produced: usize,
}

impl BatchAccumulator {
    pub fn new(object: &str, limits: BatchLimits) -> Self {
        BatchAccumulator {
            object: object.to_string(),
            limits,
            columns: None,
            header_size: 0,
            records: Vec::new(),
            running_size: 0,
            produced: 0,
        }
    }

    fn columns_for(&mut self, record: &Record) -> Result<Vec<String>, csv::Error> {
        if let Some(columns) = &self.columns {
            return Ok(columns.clone());
        }

        let mut columns = vec![ID_FIELD.to_string()];
        columns.extend(record.field_names().filter(|f| *f != ID_FIELD).cloned());
        self.header_size = wire::encode_header(&columns)?.len();
        self.columns = Some(columns.clone());
        Ok(columns)
    }

    /// Adds `record`, returning the batch it closed, if any.
    pub fn push(&mut self, record: Record) -> Result<Option<Batch>, csv::Error> {
        let columns = self.columns_for(&record)?;
        let size = wire::encode_row(&columns, &record)?.len();

        let would_fill = self.records.len() + 1 >= self.limits.max_records
            || size + self.running_size + self.header_size >= self.limits.max_bytes;
        let closed = if would_fill && !self.records.is_empty() {
            Some(self.take(columns))
        } else {
            None
        };

        self.records.push(record);
        self.running_size += size;
        Ok(closed)
    }

    /// The partial batch left at end of input.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.records.is_empty() {
            return None;
        }
        let columns = self.columns.clone().unwrap_or_default();
        Some(self.take(columns))
    }

    pub fn pending(&self) -> usize {
        self.records.len()
    }

    fn take(&mut self, columns: Vec<String>) -> Batch {
        self.produced += 1;
        let size_bytes = self.running_size + self.header_size;
        self.running_size = 0;

        Batch {
            id: format!("{}-{}-{}", self.object, self.produced, uuid::Uuid::new_v4().simple()),
            object: self.object.clone(),
            columns,
            records: std::mem::take(&mut self.records),
            size_bytes,
            ts: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(i: usize, name: &str) -> Record {
        let mut r = Record::with_id(&format!("001{i:03}"));
        r.set("Name", json!(name));
        r
    }

    fn drain(acc: &mut BatchAccumulator, records: Vec<Record>) -> Vec<Batch> {
        let mut batches: Vec<Batch> = records
            .into_iter()
            .filter_map(|r| acc.push(r).unwrap())
            .collect();
        batches.extend(acc.finish());
        batches
    }

    #[test]
    fn record_reaching_count_limit_flushes_first() {
        let mut acc = BatchAccumulator::new(
            "Account",
            BatchLimits {
                max_records: 3,
                max_bytes: usize::MAX,
            },
        );
        let batches = drain(&mut acc, (0..5).map(|i| record(i, "x")).collect());

        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(batches.iter().all(|b| b.len() < 3));
    }

    #[test]
    fn record_reaching_byte_limit_flushes_first() {
        // Header "Id,Name\n" is 8 bytes, each row "001000,abcd\n" is 12.
        let mut acc = BatchAccumulator::new(
            "Account",
            BatchLimits {
                max_records: 100,
                max_bytes: 33,
            },
        );
        let batches = drain(&mut acc, (0..3).map(|i| record(i, "abcd")).collect());

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0].size_bytes, 32);
        assert_eq!(batches[0].columns, vec!["Id", "Name"]);
        assert!(batches.iter().all(|b| b.size_bytes < 33));
    }

    #[test]
    fn never_emits_empty_batches() {
        let mut acc = BatchAccumulator::new(
            "Account",
            BatchLimits {
                max_records: 1,
                max_bytes: 1,
            },
        );
        assert!(acc.finish().is_none());

        // An oversized record still travels, alone.
        assert!(acc.push(record(0, "big")).unwrap().is_none());
        let closed = acc.push(record(1, "big")).unwrap().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(acc.finish().unwrap().len(), 1);
    }
}
