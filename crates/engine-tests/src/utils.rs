use connectors::memory::MemorySource;
use engine_core::context::DETAILS_FILE;
use model::{
    describe::{FieldDescribe, ObjectDescribe},
    job::Job,
    records::record::Record,
};
use serde_json::json;
use std::path::Path;

pub fn account_describe() -> ObjectDescribe {
    ObjectDescribe::new(
        "Account",
        vec![
            FieldDescribe::new("Id", "id").with_length(18),
            FieldDescribe::new("Name", "string").with_length(12),
            FieldDescribe::new("Phone", "phone").with_length(40),
            FieldDescribe::new("Rating", "picklist").with_picklist(&["Hot", "Warm", "Cold"]),
            FieldDescribe::new("AnnualRevenue", "currency").with_scale(18, 2),
        ],
    )
}

pub fn contact_describe() -> ObjectDescribe {
    ObjectDescribe::new(
        "Contact",
        vec![
            FieldDescribe::new("Id", "id").with_length(18),
            FieldDescribe::new("LastName", "string").with_length(80),
            FieldDescribe::new("Email", "email").with_length(80),
        ],
    )
}

pub fn account_id(i: usize) -> String {
    format!("001{i:015}")
}

pub fn account(i: usize) -> Record {
    let mut record = Record::with_id(&account_id(i));
    record.set("Name", json!(format!("Account {i}")));
    record.set("Phone", json!("+1 555 0100"));
    record.set("Rating", json!("Hot"));
    record.set("AnnualRevenue", json!(1_000_000.0));
    record
}

pub fn contact(i: usize) -> Record {
    let mut record = Record::with_id(&format!("003{i:015}"));
    record.set("LastName", json!(format!("Doe {i}")));
    record.set("Email", json!(format!("doe{i}@example.com")));
    record
}

/// In-memory org with `accounts` Account and `contacts` Contact records.
pub fn org(accounts: usize, contacts: usize) -> MemorySource {
    MemorySource::new()
        .with_object(account_describe(), (0..accounts).map(account).collect())
        .with_object(contact_describe(), (0..contacts).map(contact).collect())
}

/// Job totals must equal the sum of the per-object counters.
pub fn assert_counters_consistent(job: &Job) {
    let (successful, failed) = job.object_totals();
    assert_eq!(job.successful, successful, "successful counter drifted");
    assert_eq!(job.failed, failed, "failed counter drifted");
}

/// Number of header lines in the detail log of `job_dir`.
pub fn detail_header_count(job_dir: &Path) -> usize {
    let content = std::fs::read_to_string(job_dir.join(DETAILS_FILE)).expect("read details");
    content
        .lines()
        .filter(|line| *line == "date,message,objectName")
        .count()
}
