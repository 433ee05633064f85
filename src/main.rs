use std::env;
use std::path::Path;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metamarket_downloader::adapters::{opensea, rarible};
use metamarket_downloader::models::World;
use metamarket_downloader::services::currencies::currency_symbols;
use metamarket_downloader::services::export::run_export;
use metamarket_downloader::services::geometry::DistanceMetric;
use metamarket_downloader::services::parcels::{ParcelDirectory, DEFAULT_PARCELS_PATH};

#[derive(Parser)]
#[command(
    name = "metamarket-downloader",
    about = "Download metaverse second-market activity and export it as delimited files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download marketplace activity into the operations store
    Download {
        /// Marketplace to download from (opensea | rarible)
        #[arg(short, long)]
        source: String,
        /// World (decentraland | thesandbox)
        #[arg(short = 'x', long)]
        world: String,
        /// Blockchain (ethereum | polygon)
        #[arg(short, long)]
        blockchain: String,
        /// Asset contract address (required for rarible)
        #[arg(short = 'c', long, default_value = "")]
        asset_contract: String,
        /// Comma-separated event types to request upstream
        #[arg(short, long)]
        events: String,
    },
    /// Export stored operations to a delimited file
    Export {
        /// Marketplace whose operations drive the asset grouping
        #[arg(short, long)]
        source: String,
        /// World (decentraland | thesandbox)
        #[arg(short = 'x', long)]
        world: String,
        /// Distance metric (euclidean | manhattan)
        #[arg(short, long, default_value = "euclidean")]
        metric: String,
        /// Shorten hash/address columns to 0x123456...abcd form
        #[arg(long)]
        shorten: bool,
    },
}

fn parse_or_exit<T: FromStr<Err = String>>(value: &str) -> T {
    T::from_str(value).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(2);
    })
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metamarket_downloader=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let result = match cli.command {
        Commands::Download {
            source,
            world,
            blockchain,
            asset_contract,
            events,
        } => {
            let world: World = parse_or_exit(&world);
            let event_types: Vec<String> = events
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if event_types.is_empty() {
                eprintln!("Error: at least one event type is required");
                process::exit(2);
            }

            match source.as_str() {
                "opensea" => {
                    let parcels = ParcelDirectory::load(Path::new(DEFAULT_PARCELS_PATH))
                        .expect("Failed to load parcel directory");
                    let api_key =
                        env::var("OPENSEA_API_KEY").expect("OPENSEA_API_KEY must be set");
                    let service =
                        opensea::OpenSeaService::new(api_key, opensea::DEFAULT_BASE_URL.into());
                    opensea::run(&db, &service, world, &blockchain, &event_types, &parcels).await
                }
                "rarible" => {
                    if asset_contract.is_empty() {
                        eprintln!("Error: --asset-contract is required for rarible");
                        process::exit(2);
                    }
                    let parcels = ParcelDirectory::load(Path::new(DEFAULT_PARCELS_PATH))
                        .expect("Failed to load parcel directory");
                    let currencies = currency_symbols(&db, &blockchain)
                        .await
                        .expect("Failed to load currency directory");
                    let api_key =
                        env::var("RARIBLE_API_KEY").expect("RARIBLE_API_KEY must be set");
                    let service =
                        rarible::RaribleService::new(api_key, rarible::DEFAULT_BASE_URL.into());
                    rarible::run(
                        &db,
                        &service,
                        world,
                        &blockchain,
                        &asset_contract,
                        &event_types,
                        &parcels,
                        &currencies,
                    )
                    .await
                }
                other => {
                    eprintln!("Error: unknown source: {}", other);
                    process::exit(2);
                }
            }
        }
        Commands::Export {
            source,
            world,
            metric,
            shorten,
        } => {
            if !matches!(source.as_str(), "opensea" | "rarible") {
                eprintln!("Error: unknown source: {}", source);
                process::exit(2);
            }
            let world: World = parse_or_exit(&world);
            let metric: DistanceMetric = parse_or_exit(&metric);
            run_export(&db, world, &source, metric, shorten)
                .await
                .map(|_| ())
        }
    };

    if let Err(e) = result {
        tracing::error!("Run failed: {}", e);
        process::exit(1);
    }
}
