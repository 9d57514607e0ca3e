use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use savejob::core::{BackupJob, JobRegistry, JobResult};
use savejob::{config, context, logging};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "savejob")]
#[command(about = "Run directory backup jobs with pause, resume and stop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./savejob.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Serialize)]
struct Overrides {
    /// Enable debug-level diagnostics
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit diagnostics as JSON
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true)]
    json_logs: bool,

    /// Business log format
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true, value_parser = ["json", "xml"])]
    log_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    business_software: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    encryption_tool: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured jobs
    List,
    /// Run jobs by name, or all configured jobs when none are named
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    names: Vec<String>,

    /// Run the jobs concurrently instead of one after another
    #[arg(long)]
    parallel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::new(cli.config.as_deref(), Some(&cli.overrides))?;

    logging::init(logging::LogConfig::from(&config));

    match cli.command {
        Commands::List => run_list(&config),
        Commands::Config => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to serialize config")?
            );
            Ok(())
        }
        Commands::Run(args) => {
            let jobs = select_jobs(&config, &args.names)?;
            let ctx = context::AppContext::new(config);
            run_jobs(ctx, jobs, args.parallel).await
        }
    }
}

fn run_list(config: &config::AppConfig) -> Result<()> {
    if config.jobs.is_empty() {
        println!("No backup jobs configured.");
        return Ok(());
    }
    for job in &config.jobs {
        println!(
            "{:<20} {:<12} {} -> {}",
            job.name,
            format!("{:?}", job.mode).to_lowercase(),
            job.source.display(),
            job.target.display()
        );
    }
    Ok(())
}

fn select_jobs(config: &config::AppConfig, names: &[String]) -> Result<Vec<BackupJob>> {
    if names.is_empty() {
        return Ok(config.jobs.clone());
    }
    names
        .iter()
        .map(|name| match config.job(name) {
            Some(job) => Ok(job.clone()),
            None => bail!("Unknown backup job: {name}"),
        })
        .collect()
}

async fn run_jobs(ctx: context::AppContext, jobs: Vec<BackupJob>, parallel: bool) -> Result<()> {
    if jobs.is_empty() {
        println!("Nothing to run.");
        return Ok(());
    }

    let registry = ctx.registry.clone();
    spawn_control_reader(registry.clone());

    let ctrl_c = registry.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Stopping running jobs after their current file (Ctrl-C again to abort)...");
        ctrl_c.stop_all();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let results = if parallel {
        registry.start_many(jobs);
        registry.wait_all().await
    } else {
        registry.run_sequentially(jobs).await
    };

    report(&results)
}

/// Reads `pause <job>`, `resume <job>` and `stop <job>` commands from stdin.
fn spawn_control_reader(registry: Arc<JobRegistry>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let found = match parts.as_slice() {
                ["pause", name] => registry.pause(name),
                ["resume", name] => registry.resume(name),
                ["stop", name] => registry.stop(name),
                ["stop"] => {
                    registry.stop_all();
                    true
                }
                [] => continue,
                _ => {
                    eprintln!("Use: 'pause <job>', 'resume <job>', 'stop <job>' or 'stop'");
                    continue;
                }
            };
            if !found {
                eprintln!("No running job named '{}'", parts[1]);
            }
        }
    });
}

fn report(results: &[(String, JobResult)]) -> Result<()> {
    let mut failures = 0;
    for (name, result) in results {
        match result {
            Ok(summary) => {
                println!(
                    "{name}: {} ({} transferred, {} failed, {} skipped)",
                    summary.state,
                    summary.files_transferred,
                    summary.files_failed,
                    summary.files_skipped
                );
                if summary.state != savejob::core::BackupState::Completed {
                    failures += 1;
                }
            }
            Err(e) => {
                println!("{name}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} job(s) did not complete", results.len());
    }
    Ok(())
}
