use crate::error::CliError;
use model::{job::Job, log::LogMessage};

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found");
        return;
    }

    println!(
        "{:<38} {:<12} {:<26} {:>10} {:>10}",
        "Job", "Status", "Created", "Successful", "Failed"
    );
    for job in jobs {
        println!(
            "{:<38} {:<12} {:<26} {:>10} {:>10}",
            job.id,
            job.status.as_str(),
            job.created_date.to_rfc3339(),
            job.successful,
            job.failed
        );
    }
}

pub fn print_details(entries: &[LogMessage]) {
    for entry in entries {
        println!(
            "{} {:<20} {}",
            entry.date.to_rfc3339(),
            entry.object_name.as_deref().unwrap_or("-"),
            entry.message
        );
    }
}
