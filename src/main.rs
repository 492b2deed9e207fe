use anyhow::Result;

use ckls_mpc::config::Config;
use ckls_mpc::market_data::CsvDirectorySource;
use ckls_mpc::pipeline;

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set CKLS_MPC_CONFIG or provide config/default.toml");
            std::process::exit(1);
        }
    };

    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.level.as_str())
            }),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .json()
        .init();

    tracing::info!(
        ticker = %config.data.ticker,
        start = %config.data.start_date,
        end = %config.data.end_date,
        "Starting ckls-mpc"
    );

    let source = CsvDirectorySource::new(&config.data.csv_dir);
    let series = pipeline::load_series(&config, &source)?;
    let report = pipeline::run(&config, &series)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!(control = report.decision.control, "Done");
    Ok(())
}
