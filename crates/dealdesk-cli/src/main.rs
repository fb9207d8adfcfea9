mod generate;
mod leads;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dealdesk_core::AppConfig;
use dealdesk_store::{DocumentStore, Gateway, MemoryStore, PgStore};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dealdesk-cli")]
#[command(about = "Real-estate lead analysis from the command line")]
struct Cli {
    /// Custom identity token; the same token always maps to the same user.
    /// Without one, the session signs in anonymously.
    #[arg(long, global = true, env = "DEALDESK_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyze a property description
    Analyze {
        /// Free-text property description
        details: String,
        /// Latitude of the property (requires --lng)
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude of the property (requires --lat)
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
        /// Photo of the property to attach
        #[arg(long)]
        image: Option<PathBuf>,
        /// Persist the analyzed lead
        #[arg(long)]
        save: bool,
    },
    /// Draft an offer letter for a property
    OfferLetter {
        /// Free-text property description
        details: String,
        /// Offer range, e.g. "$180k-$200k"
        #[arg(long)]
        offer_range: String,
    },
    /// Generate synthetic leads and save them
    Generate {
        #[arg(long, default_value_t = dealdesk_ai::BATCH_LEAD_COUNT)]
        count: usize,
        /// Print the generated leads without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Import county records from a JSON array file
    ImportCounty { file: PathBuf },
    /// Compute deal profit and ROI
    Roi {
        #[arg(long)]
        purchase: Decimal,
        #[arg(long)]
        sale: Decimal,
        #[arg(long, default_value = "0")]
        closing: Decimal,
        #[arg(long, default_value = "0")]
        rehab: Decimal,
        #[arg(long, default_value = "0")]
        holding: Decimal,
    },
    /// Market-trend commentary from a JSON array of comparable sales
    Market { file: PathBuf },
    /// List saved leads
    Leads,
    /// Print lead snapshots as they change, until interrupted
    Watch,
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("dealdesk-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = dealdesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Roi {
            purchase,
            sale,
            closing,
            rehab,
            holding,
        } => leads::run_roi(purchase, sale, closing, rehab, holding),
        Commands::Db { command } => run_db(&config, &command).await,
        Commands::OfferLetter {
            details,
            offer_range,
        } => generate::run_offer_letter(&config, &details, &offer_range).await,
        Commands::Market { file } => generate::run_market(&config, &file).await,
        Commands::Analyze {
            details,
            lat,
            lng,
            image,
            save,
        } => {
            let gateway = open_gateway(&config, cli.token.as_deref()).await?;
            generate::run_analyze(
                &config,
                &gateway,
                generate::AnalyzeArgs {
                    details: &details,
                    lat,
                    lng,
                    image: image.as_deref(),
                    save,
                },
            )
            .await
        }
        Commands::Generate { count, dry_run } => {
            let gateway = open_gateway(&config, cli.token.as_deref()).await?;
            generate::run_generate(&config, &gateway, count, dry_run).await
        }
        Commands::ImportCounty { file } => {
            let gateway = open_gateway(&config, cli.token.as_deref()).await?;
            leads::run_import_county(&gateway, &file).await
        }
        Commands::Leads => {
            let gateway = open_gateway(&config, cli.token.as_deref()).await?;
            leads::run_list(&gateway).await
        }
        Commands::Watch => {
            let gateway = open_gateway(&config, cli.token.as_deref()).await?;
            leads::run_watch(&gateway).await
        }
    }
}

async fn run_db(config: &AppConfig, command: &DbCommands) -> anyhow::Result<()> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
    let pool = dealdesk_store::connect_pool(
        database_url,
        dealdesk_store::PoolConfig::from_app_config(config),
    )
    .await?;

    match command {
        DbCommands::Ping => {
            dealdesk_store::ping(&pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            dealdesk_store::run_migrations(&pool).await?;
            println!("migrations applied");
        }
    }
    Ok(())
}

/// Opens the configured store and signs a session in.
async fn open_gateway(config: &AppConfig, token: Option<&str>) -> anyhow::Result<Gateway> {
    let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = dealdesk_store::connect_pool(
                database_url,
                dealdesk_store::PoolConfig::from_app_config(config),
            )
            .await?;
            dealdesk_store::run_migrations(&pool).await?;
            Arc::new(PgStore::connect(pool).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; leads live only for this process");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway = Gateway::new(store, &config.app_id);
    let user = match token {
        Some(token) => gateway.sign_in_with_custom_token(token)?,
        None => gateway.sign_in_anonymously(),
    };
    tracing::debug!(user_id = %user, "session ready");
    Ok(gateway)
}
