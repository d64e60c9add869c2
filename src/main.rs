//! rainbowcast - one-shot rainbow prediction requests
//!
//! Operational entry point for the prediction core: wires configuration,
//! the upstream provider, and the request coordinator, issues a single
//! request, and prints the boundary envelope as JSON.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rainbowcast::cli::{Cli, RequestMode};
use rainbowcast::config::Config;
use rainbowcast::coordinator::RequestCoordinator;
use rainbowcast::error::{ApiError, ErrorKind};
use rainbowcast::store::MemorySightingStore;
use rainbowcast::types::{ApiResponse, StoredSighting};
use rainbowcast::upstream::OpenWeatherClient;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rainbowcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mode = match RequestMode::from_cli(&cli) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = Config::from_env();
    let provider = match OpenWeatherClient::new(&config) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("Failed to build upstream client: {err}");
            return ExitCode::FAILURE;
        }
    };
    let coordinator = RequestCoordinator::new(&config, provider, MemorySightingStore::new());

    match mode {
        RequestMode::Prediction => emit(
            coordinator
                .handle_prediction(cli.lat, cli.lon, &cli.client)
                .await,
            config.development,
        ),
        RequestMode::Current => emit(
            coordinator
                .handle_current(cli.lat, cli.lon, &cli.client)
                .await,
            config.development,
        ),
        RequestMode::Radar => emit(
            coordinator.handle_radar(cli.lat, cli.lon, &cli.client).await,
            config.development,
        ),
        RequestMode::History(date) => match coordinator.handle_history(date, &cli.client) {
            Ok(Some(rows)) => emit(Ok(rows), config.development),
            Ok(None) => {
                let payload = ApiError {
                    success: false,
                    status: 404,
                    message: format!("No sightings recorded on {date}"),
                };
                print_error(&payload);
                ExitCode::FAILURE
            }
            Err(err) => emit::<Vec<StoredSighting>>(Err(err), config.development),
        },
    }
}

/// Prints the boundary envelope for a coordinated request and maps the
/// outcome to an exit code
fn emit<T: Serialize>(result: Result<T, ErrorKind>, expose_detail: bool) -> ExitCode {
    match result {
        Ok(data) => match serde_json::to_string_pretty(&ApiResponse::new(data)) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("Failed to encode response: {err}");
                ExitCode::FAILURE
            }
        },
        Err(kind) => {
            print_error(&kind.to_api_error(expose_detail));
            ExitCode::FAILURE
        }
    }
}

fn print_error(payload: &ApiError) {
    let json = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| payload.message.clone());
    eprintln!("{json}");
}
