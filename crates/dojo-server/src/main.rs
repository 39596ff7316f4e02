// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dojo server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dojo_server::{create_app_state, create_router};
use dojo_server_config::{LogFormat, ServerConfig};
use dojo_server_provision::sweep_stale_staging;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Dojo server - provisions dojos from external git repositories.
#[derive(Parser, Debug)]
#[command(name = "dojo-server", about = "Dojo provisioning server", version)]
struct Args {
	/// Config file to load instead of /etc/dojo/server.toml
	#[arg(long, env = "DOJO_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("dojo-server version: {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match args.config {
		Some(path) => dojo_server_config::load_config_with_file(path)?,
		None => dojo_server_config::load_config()?,
	};

	init_tracing(&config);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		data_dir = %config.paths.data_dir.display(),
		"starting dojo-server"
	);

	let pool = dojo_server_db::create_pool(&config.database.url).await?;
	dojo_server_db::run_migrations(&pool).await?;

	std::fs::create_dir_all(config.paths.dojos_dir())?;
	std::fs::create_dir_all(config.paths.staging_dir())?;

	let state = create_app_state(pool, &config)?;
	let sweeper = spawn_staging_sweeper(&config);

	let app = create_router(state).layer(TraceLayer::new_for_http());

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	sweeper.abort();
	tracing::info!("Server shutdown complete");
	Ok(())
}

fn init_tracing(config: &ServerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	match config.logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

/// Remove staging directories abandoned by a previous process, at startup
/// and then periodically.
fn spawn_staging_sweeper(config: &ServerConfig) -> tokio::task::JoinHandle<()> {
	let staging_dir = config.paths.staging_dir();
	let max_age = Duration::from_secs(config.provision.staging_max_age_secs);
	let interval = Duration::from_secs(config.provision.staging_sweep_interval_secs.max(1));

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		loop {
			ticker.tick().await;
			if let Err(e) = sweep_stale_staging(&staging_dir, max_age).await {
				tracing::warn!(error = %e, staging_dir = %staging_dir.display(), "Staging sweep failed");
			}
		}
	})
}
