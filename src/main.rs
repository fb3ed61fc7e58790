use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use groundwork_engine::{ApplyEngine, EngineOptions, RunState};
use groundwork_graph::Run;
use groundwork_stacks::{deploy, simulate, DeploymentConfig};

/// Groundwork - declarative infrastructure orchestration
#[derive(Parser)]
#[command(name = "groundwork")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Assemble the topology and reconcile it against the simulated provider
  Up {
    /// Environment (stack) name woven into every resource name
    #[arg(long, default_value = "dev")]
    env: String,

    /// Cluster name used throughout the topology
    #[arg(long, default_value = "megocluster")]
    cluster_name: String,

    /// Maximum provider calls in flight at once
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Stop scheduling new resources after the first failure
    #[arg(long)]
    fail_fast: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match cli.command {
    Some(Commands::Up {
      env,
      cluster_name,
      concurrency,
      fail_fast,
    }) => up(env, cluster_name, concurrency, fail_fast),
    None => {
      println!("groundwork - use --help to see available commands");
      Ok(())
    }
  }
}

fn up(env: String, cluster_name: String, concurrency: usize, fail_fast: bool) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { up_async(env, cluster_name, concurrency, fail_fast).await })
}

async fn up_async(
  env: String,
  cluster_name: String,
  concurrency: usize,
  fail_fast: bool,
) -> Result<()> {
  let config = DeploymentConfig::new(&env, &cluster_name);
  let mut run = Run::new(&env);
  deploy(&mut run, &config).context("failed to assemble deployment")?;

  eprintln!("Declared {} resources for '{}'", run.nodes().len(), run.name());

  let provider = Arc::new(simulate::provider());
  let engine = ApplyEngine::new(
    provider,
    EngineOptions {
      concurrency,
      fail_fast,
    },
  );

  let cancel = CancellationToken::new();
  let report = engine
    .apply(run, RunState::new(), cancel)
    .await
    .context("apply run failed")?;

  let summary = report.summary();
  eprintln!(
    "Run {} finished: {} created, {} updated, {} unchanged, {} failed, {} skipped",
    report.run_id,
    summary.created,
    summary.updated,
    summary.unchanged,
    summary.failed,
    summary.skipped,
  );

  // Print records and exports as JSON
  println!("{}", serde_json::to_string_pretty(&report)?);

  if !report.is_success() {
    anyhow::bail!("apply finished with failed or skipped resources");
  }
  Ok(())
}
