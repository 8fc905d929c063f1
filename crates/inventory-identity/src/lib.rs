//! Identity module for the inventory system.
//!
//! Resolves the caller behind a bearer token and answers the one capability
//! question the order workflow needs: whether a user may decide on orders.
//! Token issuance and session storage live elsewhere; backends only look
//! credentials up.

use async_trait::async_trait;
use inventory_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod static_tokens;
}

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
	/// The token is unknown or has been revoked.
	#[error("Invalid credentials")]
	InvalidCredentials,
	/// The identity provider could not be reached.
	#[error("Identity provider unavailable: {0}")]
	Unavailable(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Opaque user identifier as issued by the identity provider.
pub type UserId = String;

/// Trait defining the interface for identity backends.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Maps a bearer token to the user it was issued to.
	async fn resolve_user(&self, token: &str) -> Result<UserId, IdentityError>;

	/// Whether the user holds the administrator capability.
	async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError>;
}

/// Type alias for identity factory functions.
pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>;

/// Registry trait for identity implementations.
pub trait IdentityRegistry: ImplementationRegistry<Factory = IdentityFactory> {}

/// Get all registered identity implementations.
pub fn get_all_implementations() -> Vec<(&'static str, IdentityFactory)> {
	use implementations::static_tokens;

	vec![(static_tokens::Registry::NAME, static_tokens::Registry::factory())]
}

/// Service wrapping the configured identity backend.
pub struct IdentityService {
	implementation: Box<dyn IdentityInterface>,
}

impl IdentityService {
	/// Creates a new IdentityService with the specified backend.
	pub fn new(implementation: Box<dyn IdentityInterface>) -> Self {
		Self { implementation }
	}

	/// Resolves a bearer token to a user id.
	pub async fn authenticate(&self, token: &str) -> Result<UserId, IdentityError> {
		let token = token.trim();
		if token.is_empty() {
			return Err(IdentityError::InvalidCredentials);
		}
		self.implementation.resolve_user(token).await
	}

	/// Whether the user may approve, reject or otherwise decide on orders.
	pub async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError> {
		self.implementation.is_admin(user_id).await
	}
}
