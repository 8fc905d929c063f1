//! Main entry point for the inventory order service.
//!
//! This binary loads the configuration, builds the inventory engine with the
//! configured storage and identity backends, and serves the HTTP API next to
//! the engine's background maintenance loop.

use clap::Parser;
use inventory_config::Config;
use inventory_core::{InventoryBuilder, InventoryEngine, InventoryFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the inventory service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/inventory.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the inventory service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine with all implementations
/// 5. Runs the engine (and the API, when enabled) until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started inventory service");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = Arc::clone(&engine);

			tokio::select! {
				result = engine.run() => {
					tracing::info!("Engine finished");
					result?;
				}
				result = server::start_server(api_config, api_engine) => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped inventory service");
	Ok(())
}

/// Builds the engine with every registered storage and identity backend.
fn build_engine(config: Config) -> Result<InventoryEngine, Box<dyn std::error::Error>> {
	let factories = InventoryFactories {
		storage_factories: inventory_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		identity_factories: inventory_identity::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	};

	Ok(InventoryBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_args_default_values() {
		let args = Args::parse_from(["inventory"]);
		assert_eq!(args.config, PathBuf::from("config/inventory.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["inventory", "-c", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_sample_config_parses() {
		let config: Config = include_str!("../../../config/inventory.toml")
			.parse()
			.expect("Sample config should be valid");
		assert_eq!(config.storage.primary, "file");
		assert!(config.api.as_ref().is_some_and(|api| api.enabled));
	}

	#[tokio::test]
	async fn test_build_engine_from_file_config() {
		let temp_dir = tempdir().expect("Failed to create temp dir");
		let config_path = temp_dir.path().join("inventory.toml");
		let storage_dir = temp_dir.path().join("storage");

		let config_content = format!(
			r#"
[service]
id = "test-inventory"

[storage]
primary = "file"
cleanup_interval_seconds = 120

[storage.implementations.file]
storage_path = "{}"

[identity]
primary = "static"

[identity.implementations.static]
admins = ["alice"]

[identity.implementations.static.tokens]
"token-a" = "alice"

[orders]
approval_max_retries = 3
"#,
			storage_dir.display()
		);
		std::fs::write(&config_path, config_content).expect("Failed to write config");

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.expect("Failed to load config");
		assert_eq!(config.orders.approval_max_retries, 3);

		let engine = build_engine(config).expect("Failed to build engine");
		assert_eq!(engine.config().service.id, "test-inventory");
		assert_eq!(
			engine.identity().authenticate("token-a").await.unwrap(),
			"alice"
		);
	}
}
