//! In-memory storage backend.
//!
//! Useful for tests and single-process deployments where persistence across
//! restarts is not required. A single read-write lock guards the whole map, so
//! a batch swap holds the write guard for its check and its writes.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry, SwapOp};
use async_trait::async_trait;
use inventory_types::{
	current_timestamp, ConfigSchema, ImplementationRegistry, Schema, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
	bytes: Vec<u8>,
	/// Unix seconds, `None` for permanent entries.
	expires_at: Option<u64>,
}

impl Entry {
	fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| current_timestamp().saturating_add(ttl.as_secs()));
		Self { bytes, expires_at }
	}

	fn is_live(&self, now: u64) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// In-memory storage implementation.
pub struct MemoryStorage {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store
			.get(key)
			.filter(|entry| entry.is_live(current_timestamp()))
			.map(|entry| entry.bytes.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| entry.is_live(current_timestamp())))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let now = current_timestamp();
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
			.map(|(key, _)| key.clone())
			.collect())
	}

	async fn swap_batch(&self, ops: Vec<SwapOp>) -> Result<(), StorageError> {
		let now = current_timestamp();
		let mut store = self.store.write().await;

		for op in &ops {
			let current = store
				.get(&op.key)
				.filter(|entry| entry.is_live(now))
				.map(|entry| &entry.bytes);
			if current != op.expected.as_ref() {
				return Err(StorageError::Conflict(op.key.clone()));
			}
		}

		for op in ops {
			match op.new {
				Some(bytes) => {
					store.insert(op.key, Entry::new(bytes, op.ttl));
				},
				None => {
					store.remove(&op.key);
				},
			}
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = current_timestamp();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| entry.is_live(now));
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no configuration
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "products:p-1";
		let value = b"{\"quantity\":1}".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_list_keys_by_prefix() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:1", vec![1], None).await.unwrap();
		storage.set_bytes("orders:2", vec![2], None).await.unwrap();
		storage.set_bytes("order_items:1", vec![3], None).await.unwrap();

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1".to_string(), "orders:2".to_string()]);
	}

	#[tokio::test]
	async fn test_swap_batch_checks_all_before_writing() {
		let storage = MemoryStorage::new();
		storage.set_bytes("products:a", vec![1], None).await.unwrap();

		let ops = vec![
			SwapOp {
				key: "products:a".into(),
				expected: Some(vec![1]),
				new: Some(vec![0]),
				ttl: None,
			},
			SwapOp {
				key: "products:b".into(),
				expected: Some(vec![1]),
				new: Some(vec![0]),
				ttl: None,
			},
		];
		let result = storage.swap_batch(ops).await;
		assert!(matches!(result, Err(StorageError::Conflict(k)) if k == "products:b"));
		assert_eq!(storage.get_bytes("products:a").await.unwrap(), vec![1]);
	}

	#[tokio::test]
	async fn test_swap_batch_delete() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:1", vec![7], None).await.unwrap();
		storage
			.swap_batch(vec![SwapOp {
				key: "orders:1".into(),
				expected: Some(vec![7]),
				new: None,
				ttl: None,
			}])
			.await
			.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
	}

	#[test]
	fn test_factory_rejects_non_table_config() {
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
		assert!(create_storage(&toml::Value::Table(Default::default())).is_ok());
	}
}
