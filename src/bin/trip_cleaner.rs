use std::path::PathBuf;
use std::process::exit;

use arrow::util::pretty::print_batches;
use clap::{Parser, Subcommand};
use trip_cleaner::catalog::{row_count, TripCatalog, DEFAULT_DISTANCE_RANGE, DEFAULT_QUERY_LIMIT};
use trip_cleaner::{CleaningConfig, ExclusionLog, TripCleaner, TripCleanerResult};

#[derive(Parser)]
#[command(
    name = "trip-cleaner",
    about = "Clean raw trip records and query the cleaned table"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cleaning pipeline on a raw trip file
    Clean {
        /// Raw trips (CSV or Parquet)
        #[arg(long)]
        input: PathBuf,
        /// Cleaned output CSV
        #[arg(long, default_value = "data/processed/clean_trips.csv")]
        output: PathBuf,
        /// Exclusion log file, appended to
        #[arg(long, default_value = "logs/excluded_records.log")]
        log: PathBuf,
        /// TOML file overriding the default cleaning constants
        #[arg(long, env = "TRIP_CLEANER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Look up trips in a cleaned file
    Query {
        /// Cleaned trips CSV
        #[arg(long, default_value = "data/processed/clean_trips.csv")]
        data: PathBuf,
        /// Trip identifier
        #[arg(long, conflicts_with_all = ["date", "zone", "min", "max"])]
        id: Option<String>,
        /// Pickup date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["zone", "min", "max"])]
        date: Option<String>,
        /// Pickup zone name
        #[arg(long, conflicts_with_all = ["min", "max"])]
        zone: Option<String>,
        /// Minimum trip distance in km
        #[arg(long)]
        min: Option<f64>,
        /// Maximum trip distance in km
        #[arg(long)]
        max: Option<f64>,
        /// Maximum number of trips to print
        #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
        limit: usize,
    },
}

async fn clean(
    input: PathBuf,
    output: PathBuf,
    log_path: PathBuf,
    config: Option<PathBuf>,
) -> TripCleanerResult<()> {
    let config = match config {
        Some(path) => CleaningConfig::from_toml_file(path)?,
        None => CleaningConfig::default(),
    };
    let cleaner = TripCleaner::new(config)?;
    let mut log = ExclusionLog::new();
    let result = cleaner.run(&input, &output, &mut log).await;
    // The log is kept even when the run fails.
    log.append_to_file(&log_path)?;
    let report = result?;
    println!("{}", report);
    println!("Cleaned trips written to {}", output.display());
    Ok(())
}

async fn query(
    data: PathBuf,
    id: Option<String>,
    date: Option<String>,
    zone: Option<String>,
    range: (Option<f64>, Option<f64>),
    limit: usize,
) -> TripCleanerResult<()> {
    let catalog = TripCatalog::open(&data).await?;
    let batches = if let Some(id) = id {
        catalog.trip_by_id(&id).await?.into_iter().collect()
    } else if let Some(date) = date {
        catalog.trips_by_date(&date, limit).await?
    } else if let Some(zone) = zone {
        catalog.trips_by_zone(&zone, limit).await?
    } else if range.0.is_some() || range.1.is_some() {
        let min = range.0.unwrap_or(DEFAULT_DISTANCE_RANGE.0);
        let max = range.1.unwrap_or(DEFAULT_DISTANCE_RANGE.1);
        catalog.trips_by_distance(min, max, limit).await?
    } else {
        catalog.trips(limit).await?
    };

    if batches.is_empty() {
        println!("No trips found");
    } else {
        print_batches(&batches)?;
        println!("{} trip(s)", row_count(&batches));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Clean {
            input,
            output,
            log,
            config,
        } => clean(input, output, log, config).await,
        Commands::Query {
            data,
            id,
            date,
            zone,
            min,
            max,
            limit,
        } => query(data, id, date, zone, (min, max), limit).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
