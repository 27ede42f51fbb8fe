use crate::records::record::Record;

/// A bounded group of records submitted together in one remote write.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub object: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    /// Estimated wire size of the batch, header included.
    pub size_bytes: usize,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
