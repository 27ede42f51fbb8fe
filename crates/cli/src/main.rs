use crate::error::CliError;
use clap::Parser;
use commands::Commands;
use engine_config::{env::EnvManager, settings::Settings};
use engine_runtime::{JobRunner, JobStore};
use model::manifest::JobManifest;
use std::{ffi::OsString, path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

#[derive(Parser)]
#[command(name = "maskforce", version, about = "Record masking and deletion jobs")]
struct Cli {
    #[arg(long, global = true, help = "Load MASKFORCE_* settings from this .env file")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so JSON output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::from(err.exit_code())
        }
    }
}

fn load_settings(env_file: Option<&PathBuf>) -> Result<Settings, CliError> {
    let mut env = EnvManager::from_system();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    Ok(Settings::from_env(&env)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.env_file.as_ref())?;
    let store = JobStore::from_settings(&settings);

    match cli.command {
        Commands::Run { dir, job_id } => {
            let job = JobRunner::new(&job_id, dir, Arc::new(settings)).run().await?;
            info!(job_id = %job.id, status = %job.status, "Worker done");
        }
        Commands::Create { manifest, wait } => {
            let bytes = tokio::fs::read(&manifest)
                .await
                .map_err(|source| CliError::FileRead {
                    path: manifest.display().to_string(),
                    source,
                })?;
            let manifest: JobManifest =
                serde_json::from_slice(&bytes).map_err(CliError::ManifestParse)?;

            let id = store.create(&manifest).await?;
            println!("{id}");

            let mut global_args: Vec<OsString> = Vec::new();
            if let Some(env_file) = &cli.env_file {
                global_args.push("--env-file".into());
                global_args.push(env_file.into());
            }
            let mut child = store.launch(&id, &global_args)?;

            if wait {
                let status = child.wait().await.map_err(|source| CliError::Wait {
                    job_id: id.clone(),
                    source,
                })?;
                if !status.success() {
                    return Err(CliError::Worker {
                        job_id: id,
                        status: status.to_string(),
                    });
                }
                output::print_json(&store.get(&id, true).await?)?;
            }
        }
        Commands::List {
            limit,
            offset,
            json,
        } => {
            let jobs = store.list(limit, offset).await?;
            if json {
                output::print_json(&jobs)?;
            } else {
                output::print_jobs(&jobs);
            }
        }
        Commands::Show { id, objects } => {
            output::print_json(&store.get(&id, objects).await?)?;
        }
        Commands::Log { id, json } => {
            let entries = store.details(&id).await?;
            if json {
                output::print_json(&entries)?;
            } else {
                output::print_details(&entries);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_worker_invocation() {
        let cli = Cli::try_parse_from([
            "maskforce",
            "run",
            "--dir",
            "/tmp/jobs/abc",
            "--job-id",
            "abc",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run { ref job_id, .. } if job_id == "abc"));
        assert!(cli.env_file.is_none());
    }

    #[test]
    fn env_file_is_a_global_flag() {
        let cli = Cli::try_parse_from(["maskforce", "list", "--limit", "5", "--env-file", ".env"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from(".env")));
        assert!(matches!(cli.command, Commands::List { limit: 5, offset: 0, json: false }));
    }

    #[test]
    fn env_file_overrides_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MASKFORCE_SUBMIT_CONCURRENCY=4").unwrap();

        let settings = load_settings(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(settings.deploy.concurrency, 4);
    }
}
