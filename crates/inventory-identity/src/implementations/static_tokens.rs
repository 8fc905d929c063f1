//! Identity backend backed by a fixed token table from configuration.
//!
//! ```toml
//! [identity.implementations.static]
//! admins = ["alice"]
//! [identity.implementations.static.tokens]
//! "token-a" = "alice"
//! "token-b" = "bob"
//! ```

use crate::{IdentityError, IdentityFactory, IdentityInterface, IdentityRegistry, UserId};
use async_trait::async_trait;
use inventory_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Deserialize)]
struct StaticIdentityConfig {
	#[serde(default)]
	tokens: HashMap<String, String>,
	#[serde(default)]
	admins: Vec<String>,
}

/// Token table plus the set of administrator user ids.
pub struct StaticIdentity {
	tokens: HashMap<String, UserId>,
	admins: HashSet<UserId>,
}

impl StaticIdentity {
	pub fn new(tokens: HashMap<String, UserId>, admins: HashSet<UserId>) -> Self {
		Self { tokens, admins }
	}
}

#[async_trait]
impl IdentityInterface for StaticIdentity {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticIdentitySchema)
	}

	async fn resolve_user(&self, token: &str) -> Result<UserId, IdentityError> {
		self.tokens
			.get(token)
			.cloned()
			.ok_or(IdentityError::InvalidCredentials)
	}

	async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError> {
		Ok(self.admins.contains(user_id))
	}
}

/// Configuration schema for the static identity backend.
pub struct StaticIdentitySchema;

impl ConfigSchema for StaticIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("tokens", FieldType::Map(Box::new(FieldType::String))).with_validator(
					|value| match value.as_table() {
						Some(table) if table.values().any(|v| v.as_str() == Some("")) => {
							Err("user ids cannot be empty".to_string())
						},
						_ => Ok(()),
					},
				),
				Field::new("admins", FieldType::Array(Box::new(FieldType::String))),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the static identity backend from configuration.
pub fn create_identity(config: &toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	StaticIdentitySchema
		.validate(config)
		.map_err(|e| IdentityError::Configuration(e.to_string()))?;

	let parsed: StaticIdentityConfig = config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| IdentityError::Configuration(e.to_string()))?;

	tracing::debug!(
		tokens = parsed.tokens.len(),
		admins = parsed.admins.len(),
		"Loaded static identity table"
	);

	Ok(Box::new(StaticIdentity::new(
		parsed.tokens,
		parsed.admins.into_iter().collect(),
	)))
}

/// Registry for the static identity implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = IdentityFactory;

	fn factory() -> Self::Factory {
		create_identity
	}
}

impl IdentityRegistry for Registry {}
