use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use wb_ingest::{
    AppConfig, IngestRequest, Ingestor, SqliteProductStore, WbSearchClient,
    api::{self, AppState},
    config::delay_from_secs,
    telemetry,
};

#[derive(Parser)]
#[command(name = "wb-ingest", version, about = "Wildberries product ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Run one ingestion and print the number of processed products
    Parse {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Seconds between page requests
        #[arg(long)]
        delay: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing("info")?;

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let store = Arc::new(
        SqliteProductStore::connect(&config.database)
            .await
            .context("failed to open product store")?,
    );
    let source = Arc::new(
        WbSearchClient::new(
            config.upstream.search_url.clone(),
            config.upstream.timeout,
            config.upstream.identities.clone(),
        )
        .context("failed to build upstream client")?,
    );
    let ingestor = Arc::new(Ingestor::new(source, store.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = AppState {
                store,
                ingestor,
                defaults: config.parse,
            };
            let addr = config.server_address();
            tracing::info!(%addr, "starting HTTP server");

            HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(api::configure)
            })
            .bind(&addr)
            .with_context(|| format!("failed to bind {addr}"))?
            .run()
            .await?;
        }
        Command::Parse {
            query,
            limit,
            delay,
        } => {
            let delay = match delay {
                Some(secs) => delay_from_secs(secs)
                    .ok_or_else(|| anyhow!("--delay must be a non-negative number"))?,
                None => config.parse.delay,
            };
            let req = IngestRequest::new(query)
                .with_limit(limit.unwrap_or(config.parse.limit))
                .with_delay(delay);

            let processed = ingestor.run_count(&req).await;
            println!("{processed}");
        }
    }

    Ok(())
}
