use clap::Parser;
use histoview::cli::{self, Cli, Commands};
use tracing::{debug, error, trace};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("histoview started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Fill(args) => {
            let config = cli::resolve_config(config_path, &args.target).await?;
            let report = cli::run_fill(config, &args).await?;
            println!(
                "Updated {} aggregations ({} records from {} files)",
                report.updated, report.records_read, report.locations_read
            );
        }
        Commands::List {
            target,
            cached,
            files,
        } => {
            let config = cli::resolve_config(config_path, &target).await?;
            for entry in cli::run_list(&config, &target, cached, &files).await? {
                println!("{entry}");
            }
        }
        Commands::Show { target, entry } => {
            let config = cli::resolve_config(config_path, &target).await?;
            println!("{}", cli::run_show(&config, &target, &entry).await?);
        }
        Commands::Clear { target } => {
            let config = cli::resolve_config(config_path, &target).await?;
            let removed = cli::run_clear(&config, &target).await?;
            println!("Removed {removed} cached entries");
        }
    }
    Ok(())
}
