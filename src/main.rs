use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use queryrelay::config::{
    ControllerConfig, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_VERIFY_DELAY_MS, DEFAULT_WORKER_COUNT,
};
use queryrelay::engine::{EngineRegistry, SqliteEngine};
use queryrelay::scheduler::{ExecutionPlan, Job};
use queryrelay::shutdown::install_shutdown_handler;
use queryrelay::store::{JobStore, NewJob, SqliteJobStore};
use queryrelay::Controller;

#[derive(Parser, Debug)]
#[command(name = "queryrelay")]
#[command(version)]
#[command(about = "Claims SQL jobs from a shared store and runs them on pluggable engines")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a controller that claims and runs jobs
    Run(RunArgs),

    /// Submit a new job in WAIT
    Submit(SubmitArgs),

    /// Show a job
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Path to the shared SQLite job store
    #[arg(long, env = "QUERYRELAY_DB", default_value = "jobs.sqlite")]
    db: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Identity of this controller, recorded on every claimed job.
    /// Must be unique per instance and stable across restarts.
    #[arg(long, env = "QUERYRELAY_HOST")]
    host: String,

    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    #[arg(long, default_value_t = DEFAULT_VERIFY_DELAY_MS)]
    verify_delay_ms: u64,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// SQLite database queried by the SQLITE engine (engine disabled if unset)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory for result files
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long)]
    user: String,

    /// Engine name, e.g. SQLITE
    #[arg(long)]
    engine: String,

    #[arg(long)]
    sql: String,

    /// Free-text label for the submission
    #[arg(long)]
    query_term: Option<String>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[command(flatten)]
    store: StoreArgs,

    job_id: i64,

    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run(args) => run_controller(args).await,
        Commands::Submit(args) => submit_job(args).await,
        Commands::Status(args) => show_status(args).await,
    }
}

async fn run_controller(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ControllerConfig::new(args.host)
        .with_queue_capacity(args.queue_capacity)
        .with_worker_count(args.workers)
        .with_poll_interval_ms(args.poll_interval_ms)
        .with_verify_delay_ms(args.verify_delay_ms)
        .with_batch_size(args.batch_size);

    let mut engines = EngineRegistry::new();
    match args.data {
        Some(data) => {
            engines.register("SQLITE", Arc::new(SqliteEngine::new(data, args.output_dir)));
        }
        None => tracing::warn!("No --data database given, SQLITE engine disabled"),
    }

    let store = Arc::new(SqliteJobStore::open(&args.store.db)?);
    let controller = Controller::new(config, store, engines)?;
    let shutdown = install_shutdown_handler()?;
    controller.run(shutdown).await?;
    Ok(())
}

async fn submit_job(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let plan = ExecutionPlan::new(args.engine, args.sql).to_json()?;
    let store = SqliteJobStore::open(&args.store.db)?;
    let job_id = store
        .submit(NewJob {
            user_id: args.user,
            execution_plan: plan,
            query_term: args.query_term,
        })
        .await?;
    println!("Job submitted: {}", job_id);
    Ok(())
}

async fn show_status(args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteJobStore::open(&args.store.db)?;
    let job = store.get_job_by_id(args.job_id).await?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Table => print_job(&job),
    }
    Ok(())
}

fn print_job(job: &Job) {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };
    println!("Job ID:      {}", job.id);
    println!("User:        {}", job.user_id);
    println!("State:       {}", job.state);
    println!("Host:        {}", job.host.as_deref().unwrap_or("-"));
    println!("Submitted:   {}", job.submit_time.to_rfc3339());
    println!("Started:     {}", fmt_time(job.start_time));
    println!("Ended:       {}", fmt_time(job.end_time));
    if let Some(term) = &job.query_term {
        println!("Query term:  {}", term);
    }
    println!("Plan:        {}", job.execution_plan);
    if let Some(url) = &job.report_url {
        println!("Report:      {}", url);
    }
}
