use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use fba_planner::client::RemoteBackend;
use fba_planner::config::{ServerConfig, SessionConfig};
use fba_planner::models::{CalculatorDocument, Settings};
use fba_planner::session::Session;
use fba_planner::{api, db, pricing, tree_render};

#[derive(Parser)]
#[command(name = "fbap")]
#[command(about = "Dual-currency FBA profit estimator with a branchable project tree")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port for HTTP API
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
    /// Compute a calculator document from a JSON file
    Calc {
        file: PathBuf,
    },
    /// Show the saved project tree
    Tree,
    /// Show or set the shared exchange rate (CNY per USD)
    Rate {
        value: Option<Decimal>,
    },
    /// Load a saved project into an editing session and print its figures
    Open {
        id: Uuid,
    },
}

/// Initialize tracing with output to stderr (for CLI commands) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "fba_planner=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // CLI mode: keep stdout for command output
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let db = match &config.database_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let addr = config.bind_address();
    let app = api::create_router_with_config(db, &config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("FBA planner server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn open(id: Uuid) -> anyhow::Result<()> {
    let config = SessionConfig::from_env();
    let backend = Arc::new(RemoteBackend::new(config.server_url.clone()));
    let session = Session::spawn(backend, &config);

    session.load(id).await?;
    let state = session.view();
    session.shutdown().await;

    if let Some(current) = &state.current {
        println!("{} ({})", current.meta.name, current.id);
    }
    println!("exchange rate: {}", state.document.exchange_rate());
    if let Some(result) = &state.result {
        print!("{}", result.summary_csv());
    }
    if let Some(error) = &state.error {
        eprintln!("error: {}", error);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            database,
        }) => {
            let env = ServerConfig::from_env();
            let config = ServerConfig {
                host: host.or(env.host),
                port: port.or(env.port),
                database_path: database.or(env.database_path),
                cors_origins: env.cors_origins,
            };
            serve(config).await?;
        }
        Some(Commands::Calc { file }) => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document: CalculatorDocument = serde_json::from_str(&text)
                .with_context(|| format!("Invalid calculator document in {}", file.display()))?;
            let result = pricing::calculate(&document.resynced())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Commands::Tree) => {
            let client = RemoteBackend::from_env();
            let forest = client.get_project_tree().await?;
            if forest.is_empty() {
                println!("No saved projects");
            } else {
                print!("{}", tree_render::render_forest(&forest, None));
            }
        }
        Some(Commands::Rate { value }) => {
            let client = RemoteBackend::from_env();
            let settings = match value {
                Some(rate) => {
                    if rate <= Decimal::ZERO {
                        anyhow::bail!("exchange rate must be greater than 0");
                    }
                    client
                        .update_settings(&Settings {
                            exchange_rate: rate.into(),
                        })
                        .await?
                }
                None => client.get_settings().await?,
            };
            println!("{}", settings.exchange_rate);
        }
        Some(Commands::Open { id }) => open(id).await?,
        None => serve(ServerConfig::from_env()).await?,
    }

    Ok(())
}
