//! File-based storage backend.
//!
//! Every key lives in its own `.bin` file under the configured directory.
//! Files carry a fixed header with the expiration time, and writes go through
//! a temporary file followed by a rename. Mutations are serialized by a
//! process-wide lock so that a batch swap observes and replaces a consistent
//! set of files. A batch keeps the files it is about to change and puts them
//! back if any write fails part way.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry, SwapOp};
use async_trait::async_trait;
use inventory_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header for TTL support.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "INVS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-63]: Reserved
#[derive(Debug, Clone)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"INVS";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	/// Creates a new header with the given TTL. A zero TTL never expires.
	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs())
		};

		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default TTLs per storage namespace.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` integers (seconds) from the backend table.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(secs) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.and_then(|v| u64::try_from(v).ok())
				{
					ttls.insert(storage_key, Duration::from_secs(secs));
				}
			}
		}

		Self { ttls }
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// Payload of a raw file, `None` when it has expired.
fn live_payload(raw: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
	let header = FileHeader::deserialize(raw)?;
	if header.is_expired() {
		return Ok(None);
	}
	Ok(Some(raw[FileHeader::SIZE..].to_vec()))
}

/// Writes `data` next to `path` with the given extension, then renames it
/// over `path` so readers never see a partial file.
async fn replace_file(path: &Path, data: &[u8], temp_extension: &str) -> Result<(), StorageError> {
	let temp_path = path.with_extension(temp_extension);
	fs::write(&temp_path, data)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	fs::rename(&temp_path, path)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))
}

/// Escapes a key into a file stem that can be mapped back to the key.
fn encode_file_stem(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for c in key.chars() {
		match c {
			'%' => out.push_str("%25"),
			'/' => out.push_str("%2F"),
			'\\' => out.push_str("%5C"),
			':' => out.push_str("%3A"),
			'.' => out.push_str("%2E"),
			c => out.push(c),
		}
	}
	out
}

fn decode_file_stem(stem: &str) -> Option<String> {
	let mut out = String::with_capacity(stem.len());
	let mut rest = stem;
	while let Some(pos) = rest.find('%') {
		out.push_str(&rest[..pos]);
		let code = rest.get(pos + 1..pos + 3)?;
		out.push(match code {
			"25" => '%',
			"2F" => '/',
			"5C" => '\\',
			"3A" => ':',
			"2E" => '.',
			_ => return None,
		});
		rest = &rest[pos + 3..];
	}
	out.push_str(rest);
	Some(out)
}

/// File-based storage implementation.
///
/// Stores data as binary files on the filesystem, providing simple
/// persistence without requiring external services.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// TTL configuration for different storage namespaces.
	ttl_config: TtlConfig,
	/// Serializes every mutation issued through this instance.
	write_lock: Mutex<()>,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path and TTL config.
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
			write_lock: Mutex::new(()),
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.bin", encode_file_stem(key)))
	}

	/// Gets the default TTL for a key from its namespace prefix.
	fn get_ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.map(|sk| self.ttl_config.get_ttl(sk))
			.unwrap_or(Duration::ZERO)
	}

	/// Reads the whole file of a key, header included.
	async fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(self.get_file_path(key)).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	/// Reads the live payload of a key, `None` when absent or expired.
	async fn read_live(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		match self.read_raw(key).await? {
			Some(raw) => live_payload(&raw),
			None => Ok(None),
		}
	}

	async fn write_file(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		let header = FileHeader::new(ttl).serialize();

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header);
		file_data.extend_from_slice(value);

		replace_file(&path, &file_data, "tmp").await
	}

	/// Puts a key back to the raw file it had before a batch started.
	async fn restore_raw(&self, key: &str, raw: Option<&[u8]>) -> Result<(), StorageError> {
		match raw {
			Some(data) => replace_file(&self.get_file_path(key), data, "restore").await,
			None => self.remove_file(key).await,
		}
	}

	async fn remove_file(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	/// Keys of every `.bin` file in the storage directory.
	async fn stored_keys(&self) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			match path
				.file_stem()
				.and_then(|s| s.to_str())
				.and_then(decode_file_stem)
			{
				Some(key) => keys.push(key),
				None => tracing::debug!("Skipping file {:?}: not a storage key", path),
			}
		}
		Ok(keys)
	}

	/// Removes all expired files from storage.
	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut removed = 0;

		for key in self.stored_keys().await? {
			let path = self.get_file_path(&key);
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					continue;
				},
			};
			let Ok(header) = FileHeader::deserialize(&data) else {
				tracing::debug!("Skipping file {:?}: no valid header", path);
				continue;
			};
			if header.is_expired() {
				if let Err(e) = fs::remove_file(&path).await {
					tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
				} else {
					removed += 1;
				}
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(key).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.write_file(key, &value, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.remove_file(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_live(key).await?.is_some())
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut live = Vec::new();
		for key in self.stored_keys().await? {
			if key.starts_with(prefix) && self.read_live(&key).await?.is_some() {
				live.push(key);
			}
		}
		Ok(live)
	}

	async fn swap_batch(&self, ops: Vec<SwapOp>) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;

		// Raw files as they were before the batch, in op order
		let mut snapshots = Vec::with_capacity(ops.len());
		for op in &ops {
			let raw = self.read_raw(&op.key).await?;
			let live = match &raw {
				Some(raw) => live_payload(raw)?,
				None => None,
			};
			if live != op.expected {
				return Err(StorageError::Conflict(op.key.clone()));
			}
			snapshots.push(raw);
		}

		for (applied, op) in ops.iter().enumerate() {
			let result = match &op.new {
				Some(bytes) => self.write_file(&op.key, bytes, op.ttl).await,
				None => self.remove_file(&op.key).await,
			};
			if let Err(e) = result {
				tracing::warn!(key = %op.key, error = %e, "Batch write failed, restoring earlier files");
				for (op, raw) in ops.iter().zip(&snapshots).take(applied + 1) {
					if let Err(restore_err) = self.restore_raw(&op.key, raw.as_deref()).await {
						tracing::error!(
							key = %op.key,
							error = %restore_err,
							"Failed to restore file after batch failure"
						);
					}
				}
				return Err(e);
			}
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];

		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_<namespace>`: TTL in seconds for records of that namespace (default: 0, never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage_in(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[test]
	fn test_file_stem_round_trips_keys() {
		for key in ["orders:abc", "a/b:c.d", "100%:x"] {
			let stem = encode_file_stem(key);
			assert!(!stem.contains([':', '/', '.']));
			assert_eq!(decode_file_stem(&stem).as_deref(), Some(key));
		}
		assert_eq!(decode_file_stem("bad%ZZ"), None);
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);

		storage
			.set_bytes("products:p-1", b"hello".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("products:p-1").await.unwrap(), b"hello");
		assert!(storage.exists("products:p-1").await.unwrap());

		storage.delete("products:p-1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("products:p-1").await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine
		storage.delete("products:p-1").await.unwrap();
	}

	#[tokio::test]
	async fn test_list_keys_recovers_original_keys() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		storage.set_bytes("orders:1", vec![1], None).await.unwrap();
		storage.set_bytes("orders:2", vec![2], None).await.unwrap();
		storage.set_bytes("order_items:9", vec![3], None).await.unwrap();

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1".to_string(), "orders:2".to_string()]);
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);

		// Write a header that expired in the past
		let mut data = FileHeader {
			version: FileHeader::VERSION,
			expires_at: 1,
		}
		.serialize()
		.to_vec();
		data.extend_from_slice(b"old");
		std::fs::write(storage.get_file_path("submission_tokens:t"), data).unwrap();
		storage
			.set_bytes("orders:keep", b"x".to_vec(), None)
			.await
			.unwrap();

		assert!(!storage.exists("submission_tokens:t").await.unwrap());
		assert!(storage.list_keys("submission_tokens:").await.unwrap().is_empty());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("orders:keep").await.unwrap());
	}

	#[tokio::test]
	async fn test_swap_batch_is_all_or_nothing() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		storage.set_bytes("products:a", vec![5], None).await.unwrap();

		let stale = vec![
			SwapOp {
				key: "products:a".into(),
				expected: Some(vec![5]),
				new: Some(vec![4]),
				ttl: None,
			},
			SwapOp {
				key: "orders:o".into(),
				expected: Some(vec![0]),
				new: None,
				ttl: None,
			},
		];
		assert!(matches!(
			storage.swap_batch(stale).await,
			Err(StorageError::Conflict(k)) if k == "orders:o"
		));
		assert_eq!(storage.get_bytes("products:a").await.unwrap(), vec![5]);

		storage
			.swap_batch(vec![SwapOp {
				key: "products:a".into(),
				expected: Some(vec![5]),
				new: Some(vec![4]),
				ttl: None,
			}])
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("products:a").await.unwrap(), vec![4]);
	}

	#[tokio::test]
	async fn test_failed_write_restores_earlier_ops() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		storage.set_bytes("products:a", vec![3], None).await.unwrap();
		storage.set_bytes("orders:o-1", vec![0], None).await.unwrap();

		// A directory where the temp file should go makes the last write fail
		let blocker = storage.get_file_path("orders:o-1").with_extension("tmp");
		std::fs::create_dir(&blocker).unwrap();

		let batch = || {
			vec![
				SwapOp {
					key: "products:a".into(),
					expected: Some(vec![3]),
					new: Some(vec![1]),
					ttl: None,
				},
				SwapOp {
					key: "order_items:i-1".into(),
					expected: None,
					new: Some(vec![2]),
					ttl: None,
				},
				SwapOp {
					key: "orders:o-1".into(),
					expected: Some(vec![0]),
					new: Some(vec![1]),
					ttl: None,
				},
			]
		};

		let err = storage.swap_batch(batch()).await.unwrap_err();
		assert!(matches!(err, StorageError::Backend(_)));
		assert_eq!(storage.get_bytes("products:a").await.unwrap(), vec![3]);
		assert!(!storage.exists("order_items:i-1").await.unwrap());
		assert_eq!(storage.get_bytes("orders:o-1").await.unwrap(), vec![0]);

		std::fs::remove_dir(&blocker).unwrap();
		storage.swap_batch(batch()).await.unwrap();
		assert_eq!(storage.get_bytes("products:a").await.unwrap(), vec![1]);
		assert_eq!(storage.get_bytes("order_items:i-1").await.unwrap(), vec![2]);
		assert_eq!(storage.get_bytes("orders:o-1").await.unwrap(), vec![1]);
	}

	#[test]
	fn test_ttl_config_from_namespace() {
		let config: toml::Value = toml::from_str("ttl_submission_tokens = 3600").unwrap();
		let storage = FileStorage::new(PathBuf::from("/tmp"), TtlConfig::from_config(&config));
		assert_eq!(
			storage.get_ttl_for_key("submission_tokens:abc"),
			Duration::from_secs(3600)
		);
		assert_eq!(storage.get_ttl_for_key("orders:abc"), Duration::ZERO);
	}

	#[test]
	fn test_schema_rejects_negative_ttl() {
		let config: toml::Value = toml::from_str("ttl_orders = -1").unwrap();
		assert!(FileStorageSchema.validate(&config).is_err());
	}
}
