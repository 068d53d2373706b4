use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lookout_lite::config::{DashboardConfig, TableConfig, DEFAULT_PAGE_SIZE};
use lookout_lite::dashboard::{run_dashboard, synchronize, DashboardState, TableSnapshot};
use lookout_lite::query::fake::generate_jobs;
use lookout_lite::query::FakeJobsService;
use lookout_lite::shutdown::shutdown_token;
use lookout_lite::table::{JobsTable, PassOutcome};
use lookout_lite::tree::{Row, RowId, VisibleRow};

#[derive(Parser, Debug)]
#[command(name = "lookout-lite")]
#[command(version)]
#[command(about = "Lazily loaded, grouped job tables over a job query service")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the jobs table API over a generated dataset
    Serve(ServeArgs),

    /// Build a tree once and print it
    Tree(TreeArgs),
}

// =============================================================================
// Arguments
// =============================================================================

/// Dataset options shared by both commands.
#[derive(Parser, Debug)]
struct DatasetArgs {
    /// Number of jobs to generate
    #[arg(long, default_value = "1000")]
    jobs: usize,

    /// Seed for the job generator
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of distinct queues
    #[arg(long, default_value = "4")]
    queues: usize,

    /// Number of distinct job sets
    #[arg(long, default_value = "10")]
    job_sets: usize,

    /// Rows per page, at the root and under each group
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Grouping dimensions, outermost first (comma-separated)
    /// Example: "queue,jobSet,state"
    #[arg(long, value_delimiter = ',')]
    group_by: Vec<String>,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Port for the dashboard API
    #[arg(long, default_value = "8089")]
    port: u16,

    #[command(flatten)]
    dataset: DatasetArgs,
}

#[derive(Parser, Debug)]
struct TreeArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    /// Row to expand, applied in order (repeatable)
    /// Example: --expand queue:queue-1 --expand "queue:queue-1>jobSet:job-set-2"
    #[arg(long)]
    expand: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

impl DatasetArgs {
    fn to_config(&self, listen_addr: SocketAddr) -> DashboardConfig {
        DashboardConfig {
            listen_addr,
            jobs: self.jobs,
            seed: self.seed,
            queues: self.queues,
            job_sets: self.job_sets,
            table: TableConfig::new(self.page_size).with_grouping(self.group_by.clone()),
        }
    }
}

fn build_table(config: &DashboardConfig) -> JobsTable {
    let jobs = generate_jobs(config.jobs, config.seed, config.queues, config.job_sets);
    let service = Arc::new(FakeJobsService::new(jobs));
    JobsTable::with_service(config.table.clone(), service)
}

fn report_failures(outcomes: &[PassOutcome]) -> Result<(), Box<dyn std::error::Error>> {
    for outcome in outcomes {
        if let PassOutcome::Failed(e) = outcome {
            return Err(format!("Failed to load rows: {}", e).into());
        }
    }
    Ok(())
}

fn describe(row: &Row) -> String {
    match row {
        Row::Job(job) => format!(
            "{:<38} {:<10} {:<12} {:<10} cpu={}",
            job.job.job_id, job.job.queue, job.job.job_set, job.job.state, job.job.cpu
        ),
        Row::Group(group) => {
            let loaded = match group.sub_row_count {
                Some(total) => format!(" [{}/{} loaded]", group.loaded_sub_rows(), total),
                None => String::new(),
            };
            format!(
                "{}={} ({} jobs){}",
                group.dimension, group.value, group.job_count, loaded
            )
        }
    }
}

fn print_table(snapshot: &TableSnapshot) {
    if snapshot.rows.is_empty() {
        println!("No jobs found.");
        return;
    }

    for visible in &snapshot.rows {
        match visible {
            VisibleRow::Row {
                depth,
                expanded,
                row,
            } => {
                let marker = match (row.is_group(), expanded) {
                    (true, true) => "[-] ",
                    (true, false) => "[+] ",
                    (false, _) => "",
                };
                println!("{}{}{}", "  ".repeat(*depth), marker, describe(row));
            }
            VisibleRow::LoadMore { depth, parent, skip } => {
                println!(
                    "{}... more under {} (next from {})",
                    "  ".repeat(*depth),
                    parent,
                    skip
                );
            }
        }
    }

    println!();
    println!(
        "Page {} of {} ({} root rows)",
        snapshot.pagination.page_index + 1,
        snapshot.page_count.max(1),
        snapshot.total_row_count
    );
}

// =============================================================================
// Commands
// =============================================================================

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args
        .dataset
        .to_config(SocketAddr::from(([0, 0, 0, 0], args.port)));

    tracing::info!(
        listen_addr = %config.listen_addr,
        jobs = config.jobs,
        seed = config.seed,
        queues = config.queues,
        job_sets = config.job_sets,
        page_size = config.table.page_size,
        grouping = ?config.table.grouping,
        "Starting lookout-lite dashboard"
    );

    let table = build_table(&config);
    let state = DashboardState::new(table);
    synchronize(&state.table).await;

    let shutdown = shutdown_token();
    run_dashboard(config.listen_addr, state, shutdown).await;

    tracing::info!("Dashboard stopped");
    Ok(())
}

async fn run_tree(args: TreeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.dataset.to_config(DashboardConfig::default().listen_addr);
    let mut table = build_table(&config);
    report_failures(&table.sync().await)?;

    for raw in &args.expand {
        let row_id = RowId::parse(raw)?;
        if table.find_row(&row_id).is_none() {
            tracing::warn!(row_id = %row_id, "Row is not loaded, expanding anyway");
        }
        if !table.expanded().contains(&row_id) {
            table.toggle_expanded(&row_id);
        }
        report_failures(&table.sync().await)?;
    }

    let snapshot = TableSnapshot::of(&table);
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Table => print_table(&snapshot),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Commands::Serve(serve_args) => run_serve(serve_args).await?,
        Commands::Tree(tree_args) => run_tree(tree_args).await?,
    }

    Ok(())
}
