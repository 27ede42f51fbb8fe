use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one job inside its directory (worker process)
    Run {
        #[arg(long, help = "Job directory holding the manifest")]
        dir: PathBuf,

        #[arg(long, help = "Job ID")]
        job_id: String,
    },
    /// Create a job from a manifest file and start its worker
    Create {
        #[arg(long, help = "Job manifest file path")]
        manifest: PathBuf,

        #[arg(long, help = "Wait for the worker to finish and print the final state")]
        wait: bool,
    },
    /// List jobs, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, help = "Print the jobs as JSON instead of a table")]
        json: bool,
    },
    /// Show the state document of one job
    Show {
        id: String,

        #[arg(long, help = "Include per-object statistics")]
        objects: bool,
    },
    /// Print the detail log of one job
    Log {
        id: String,

        #[arg(long, help = "Print the entries as JSON")]
        json: bool,
    },
}
