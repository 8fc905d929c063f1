//! Storage module for the inventory system.
//!
//! This module provides the persistence collaborator used by the catalog and
//! the order workflow. Backends implement a small byte-oriented key-value
//! interface with prefix listing and an atomic multi-key compare-and-swap;
//! [`StorageService`] layers typed JSON records, namespaces and simple
//! filtered queries on top of it.

use async_trait::async_trait;
use inventory_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

mod query;

pub use query::QueryFilter;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// A compare-and-swap precondition did not hold.
	#[error("Conflicting write on key {0}")]
	Conflict(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// One conditional write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapOp {
	/// Full storage key.
	pub key: String,
	/// Bytes the key must currently hold; `None` means the key must be absent.
	pub expected: Option<Vec<u8>>,
	/// Bytes to write; `None` deletes the key.
	pub new: Option<Vec<u8>>,
	/// Time-to-live for the new value.
	pub ttl: Option<Duration>,
}

/// Trait defining the low-level interface for storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every live key starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Applies every operation or none of them.
	///
	/// All `expected` preconditions are checked before anything is written.
	/// The first mismatch fails the whole batch with [`StorageError::Conflict`].
	async fn swap_batch(&self, ops: Vec<SwapOp>) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage.
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples used by the service binary to
/// build its factory map.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn make_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A record read together with the exact bytes it was decoded from.
///
/// The raw bytes act as the version for a later compare-and-swap.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	key: String,
	raw: Vec<u8>,
}

impl<T> Versioned<T> {
	/// Full storage key of the record.
	pub fn key(&self) -> &str {
		&self.key
	}
}

/// Builder for an atomic set of conditional writes.
#[derive(Debug, Default)]
pub struct WriteBatch {
	ops: Vec<SwapOp>,
}

impl WriteBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a record that must not exist yet.
	pub fn insert<T: Serialize>(
		&mut self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<&mut Self, StorageError> {
		self.insert_with_ttl(namespace, id, data, None)
	}

	/// Creates a record that must not exist yet, expiring after `ttl`.
	pub fn insert_with_ttl<T: Serialize>(
		&mut self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<&mut Self, StorageError> {
		self.ops.push(SwapOp {
			key: make_key(namespace, id),
			expected: None,
			new: Some(encode(data)?),
			ttl,
		});
		Ok(self)
	}

	/// Replaces a record only if it still holds the version that was read.
	pub fn replace<T, U: Serialize>(
		&mut self,
		current: &Versioned<T>,
		data: &U,
	) -> Result<&mut Self, StorageError> {
		self.ops.push(SwapOp {
			key: current.key.clone(),
			expected: Some(current.raw.clone()),
			new: Some(encode(data)?),
			ttl: None,
		});
		Ok(self)
	}

	/// Fails the batch if the record exists, without writing anything to it.
	pub fn require_absent(&mut self, namespace: &str, id: &str) -> &mut Self {
		self.ops.push(SwapOp {
			key: make_key(namespace, id),
			expected: None,
			new: None,
			ttl: None,
		});
		self
	}

	/// Deletes a record only if it still holds the version that was read.
	pub fn remove<T>(&mut self, current: &Versioned<T>) -> &mut Self {
		self.ops.push(SwapOp {
			key: current.key.clone(),
			expected: Some(current.raw.clone()),
			new: None,
			ttl: None,
		});
		self
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}
}

/// High-level storage service that provides typed operations.
///
/// Wraps a low-level backend and stores records as JSON under
/// `namespace:id` keys.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&make_key(namespace, id), encode(data)?, None)
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&make_key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Retrieves a value along with the version needed for a later swap.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let key = make_key(namespace, id);
		let raw = self.backend.get_bytes(&key).await?;
		let value = decode(&raw)?;
		Ok(Versioned { value, key, raw })
	}

	/// Updates an existing value. Fails with NotFound when absent.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = make_key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, encode(data)?, None).await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&make_key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&make_key(namespace, id)).await
	}

	/// Lists every record of a namespace.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		self.query(namespace, &[]).await
	}

	/// Lists the records of a namespace matching every filter.
	///
	/// Records that disappear between listing and reading are skipped.
	pub async fn query<T: DeserializeOwned>(
		&self,
		namespace: &str,
		filters: &[QueryFilter],
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut keys = self.backend.list_keys(&prefix).await?;
		keys.sort();

		let mut results = Vec::with_capacity(keys.len());
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let record: serde_json::Value = decode(&bytes)?;
			if filters.iter().all(|f| f.matches(&record)) {
				results.push(
					serde_json::from_value(record)
						.map_err(|e| StorageError::Serialization(e.to_string()))?,
				);
			}
		}
		Ok(results)
	}

	/// Commits a batch atomically.
	pub async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		if batch.is_empty() {
			return Ok(());
		}
		self.backend.swap_batch(batch.ops).await
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
