//! Configuration builder for test and development configurations.

use crate::{
	ApiConfig, Config, IdentityConfig, OrdersConfig, ServiceConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to in-memory storage and a static identity backend with no
/// tokens, which is enough for most tests.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	identity_primary: String,
	identity_implementations: HashMap<String, toml::Value>,
	orders: OrdersConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-inventory".to_string(),
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::from([("memory".to_string(), empty_table())]),
			identity_primary: "static".to_string(),
			identity_implementations: HashMap::from([("static".to_string(), empty_table())]),
			orders: OrdersConfig::default(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the primary storage implementation and its table.
	pub fn storage(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		let primary = primary.into();
		self.storage_implementations.insert(primary.clone(), config);
		self.storage_primary = primary;
		self
	}

	/// Sets the primary identity implementation and its table.
	pub fn identity(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		let primary = primary.into();
		self.identity_implementations.insert(primary.clone(), config);
		self.identity_primary = primary;
		self
	}

	pub fn approval_max_retries(mut self, retries: u32) -> Self {
		self.orders.approval_max_retries = retries;
		self
	}

	pub fn low_stock_threshold(mut self, threshold: u32) -> Self {
		self.orders.low_stock_threshold = threshold;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
				cleanup_interval_seconds: 60,
			},
			identity: IdentityConfig {
				primary: self.identity_primary,
				implementations: self.identity_implementations,
			},
			orders: self.orders,
			api: self.api,
		}
	}
}
