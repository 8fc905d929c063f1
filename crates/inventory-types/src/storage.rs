//! Storage-related types for the inventory system.

use std::str::FromStr;

/// Storage namespaces for the persisted collections.
///
/// Replaces string literals in storage calls with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records
	Orders,
	/// Order item records, keyed by item id
	OrderItems,
	/// Stock products
	Products,
	/// Unique equipment
	Equipment,
	/// Submission token to order id mapping
	SubmissionTokens,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderItems => "order_items",
			StorageKey::Products => "products",
			StorageKey::Equipment => "equipment",
			StorageKey::SubmissionTokens => "submission_tokens",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::OrderItems,
			Self::Products,
			Self::Equipment,
			Self::SubmissionTokens,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"order_items" => Ok(Self::OrderItems),
			"products" => Ok(Self::Products),
			"equipment" => Ok(Self::Equipment),
			"submission_tokens" => Ok(Self::SubmissionTokens),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_key_parses_back() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("quotes".parse::<StorageKey>().is_err());
	}
}
