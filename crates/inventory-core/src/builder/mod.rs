//! Builder pattern for constructing inventory engines.
//!
//! Composes an InventoryEngine from the configured storage and identity
//! backends using factory functions, so the binary decides which
//! implementations are available.

use crate::engine::{event_bus::EventBus, InventoryEngine};
use inventory_config::Config;
use inventory_identity::{IdentityError, IdentityInterface, IdentityService};
use inventory_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for the factory functions needed to build an InventoryEngine.
pub struct InventoryFactories<SF, IF> {
	pub storage_factories: HashMap<String, SF>,
	pub identity_factories: HashMap<String, IF>,
}

/// Builder for constructing an InventoryEngine with pluggable implementations.
pub struct InventoryBuilder {
	config: Config,
}

impl InventoryBuilder {
	/// Creates a new InventoryBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the InventoryEngine using the factories for each backend.
	pub fn build<SF, IF>(
		self,
		factories: InventoryFactories<SF, IF>,
	) -> Result<InventoryEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		IF: Fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			} else {
				tracing::warn!(component = "storage", implementation = %name, "Unknown implementation, skipping");
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create identity implementations
		let mut identity_impls = HashMap::new();
		for (name, config) in &self.config.identity.implementations {
			if let Some(factory) = factories.identity_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						identity_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.identity.primary == name;
						tracing::info!(component = "identity", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "identity",
							implementation = %name,
							error = %e,
							"Failed to create identity implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create identity implementation '{}': {}",
							name, e
						)));
					},
				}
			} else {
				tracing::warn!(component = "identity", implementation = %name, "Unknown implementation, skipping");
			}
		}

		let primary_identity = &self.config.identity.primary;
		let identity_backend = identity_impls.remove(primary_identity).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary identity '{}' failed to load or has invalid configuration",
				primary_identity
			))
		})?;
		let identity = Arc::new(IdentityService::new(identity_backend));

		Ok(InventoryEngine::new(
			self.config,
			storage,
			identity,
			EventBus::new(1000),
		))
	}
}
