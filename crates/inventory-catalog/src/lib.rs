//! Catalog provider for the inventory system.
//!
//! Lists what can currently be ordered and maintains the catalog records the
//! approval workflow later decrements. Stock products live in the `products`
//! namespace and equipment in `equipment`; an id is unique across both.

use inventory_storage::{QueryFilter, StorageError, StorageService, WriteBatch};
use inventory_types::{
	current_timestamp, CatalogItem, CatalogItemKind, EquipmentStatus, InventorySummary,
	StockProduct, StorageKey, UniqueEquipment,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

mod categories;

pub use categories::{category_label, CategoryInfo, EquipmentCategory};

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Catalog item not found: {0}")]
	NotFound(String),
	#[error("Catalog item already exists: {0}")]
	AlreadyExists(String),
	#[error("Invalid catalog item: {0}")]
	Validation(String),
	/// The record changed between read and write.
	#[error("Catalog item {0} was modified concurrently")]
	Conflict(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for CatalogError {
	fn from(err: StorageError) -> Self {
		CatalogError::Storage(err.to_string())
	}
}

/// Storage namespace holding records of the given kind.
pub fn namespace_for(kind: CatalogItemKind) -> &'static str {
	match kind {
		CatalogItemKind::Product => StorageKey::Products.as_str(),
		CatalogItemKind::Equipment => StorageKey::Equipment.as_str(),
	}
}

/// Optional narrowing of the orderable listing.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
	pub category: Option<String>,
	/// Case-insensitive substring of the name, SKU or serial number.
	pub search: Option<String>,
	pub kind: Option<CatalogItemKind>,
}

impl CatalogFilter {
	fn wants(&self, kind: CatalogItemKind) -> bool {
		self.kind.is_none_or(|k| k == kind)
	}

	fn matches_search(&self, item: &CatalogItem) -> bool {
		let Some(needle) = self
			.search
			.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
		else {
			return true;
		};
		let needle = needle.to_lowercase();
		item.name().to_lowercase().contains(&needle) || item.code().to_lowercase().contains(&needle)
	}

	fn category_filter(&self) -> Option<QueryFilter> {
		self.category
			.as_deref()
			.filter(|c| !c.is_empty())
			.map(|c| QueryFilter::eq("category_id", c))
	}
}

/// Service providing catalog reads and maintenance.
pub struct CatalogService {
	storage: Arc<StorageService>,
}

impl CatalogService {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Items that can be ordered right now, sorted by name.
	///
	/// Products need stock above zero and equipment must be active.
	pub async fn list_orderable(
		&self,
		filter: &CatalogFilter,
	) -> Result<Vec<CatalogItem>, CatalogError> {
		let mut items: Vec<CatalogItem> = Vec::new();

		if filter.wants(CatalogItemKind::Product) {
			let mut filters = vec![QueryFilter::gt("quantity_available", 0)];
			filters.extend(filter.category_filter());
			let products: Vec<StockProduct> = self
				.storage
				.query(StorageKey::Products.as_str(), &filters)
				.await?;
			items.extend(products.into_iter().map(CatalogItem::from));
		}

		if filter.wants(CatalogItemKind::Equipment) {
			let mut filters = vec![QueryFilter::eq("status", EquipmentStatus::Active.as_str())];
			filters.extend(filter.category_filter());
			let equipment: Vec<UniqueEquipment> = self
				.storage
				.query(StorageKey::Equipment.as_str(), &filters)
				.await?;
			items.extend(equipment.into_iter().map(CatalogItem::from));
		}

		items.retain(|item| filter.matches_search(item));
		items.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
		Ok(items)
	}

	/// Fetches one item by id, whatever its kind.
	pub async fn get_item(&self, id: &str) -> Result<CatalogItem, CatalogError> {
		match self
			.storage
			.retrieve::<StockProduct>(StorageKey::Products.as_str(), id)
			.await
		{
			Ok(product) => return Ok(product.into()),
			Err(StorageError::NotFound) => {},
			Err(e) => return Err(e.into()),
		}
		match self
			.storage
			.retrieve::<UniqueEquipment>(StorageKey::Equipment.as_str(), id)
			.await
		{
			Ok(equipment) => Ok(equipment.into()),
			Err(StorageError::NotFound) => Err(CatalogError::NotFound(id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// Adds a new stock product.
	pub async fn register_product(
		&self,
		mut product: StockProduct,
	) -> Result<StockProduct, CatalogError> {
		validate_common(&product.id, &product.name, &product.sku, product.unit_price)?;
		if product.cost.is_some_and(|c| c.is_sign_negative()) {
			return Err(CatalogError::Validation("cost cannot be negative".into()));
		}
		product.updated_at = current_timestamp();
		self.insert_unique(CatalogItemKind::Product, &product.id, &product)
			.await?;
		tracing::info!(item_id = %product.id, sku = %product.sku, "Registered product");
		Ok(product)
	}

	/// Adds a new piece of equipment.
	pub async fn register_equipment(
		&self,
		mut equipment: UniqueEquipment,
	) -> Result<UniqueEquipment, CatalogError> {
		validate_common(
			&equipment.id,
			&equipment.name,
			&equipment.serial_number,
			equipment.unit_price,
		)?;
		equipment.updated_at = current_timestamp();
		self.insert_unique(CatalogItemKind::Equipment, &equipment.id, &equipment)
			.await?;
		tracing::info!(
			item_id = %equipment.id,
			serial = %equipment.serial_number,
			"Registered equipment"
		);
		Ok(equipment)
	}

	async fn insert_unique<T: serde::Serialize>(
		&self,
		kind: CatalogItemKind,
		id: &str,
		record: &T,
	) -> Result<(), CatalogError> {
		let other = match kind {
			CatalogItemKind::Product => CatalogItemKind::Equipment,
			CatalogItemKind::Equipment => CatalogItemKind::Product,
		};
		// Ids are unique across both namespaces
		let mut batch = WriteBatch::new();
		batch.require_absent(namespace_for(other), id);
		batch.insert(namespace_for(kind), id, record)?;
		match self.storage.commit(batch).await {
			Ok(()) => Ok(()),
			Err(StorageError::Conflict(_)) => Err(CatalogError::AlreadyExists(id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// Sets the stock of a product, returning the previous quantity.
	pub async fn set_product_stock(&self, id: &str, quantity: u32) -> Result<u32, CatalogError> {
		let current = self
			.storage
			.retrieve_versioned::<StockProduct>(StorageKey::Products.as_str(), id)
			.await
			.map_err(|e| not_found_or(e, id))?;

		let previous = current.value.quantity_available;
		let mut updated = current.value.clone();
		updated.quantity_available = quantity;
		updated.updated_at = current_timestamp();

		let mut batch = WriteBatch::new();
		batch.replace(&current, &updated)?;
		self.commit_replace(batch, id).await?;

		tracing::info!(item_id = %id, previous, current = quantity, "Product stock set");
		Ok(previous)
	}

	/// Moves equipment to a new status, returning the previous one.
	pub async fn set_equipment_status(
		&self,
		id: &str,
		status: EquipmentStatus,
	) -> Result<EquipmentStatus, CatalogError> {
		let current = self
			.storage
			.retrieve_versioned::<UniqueEquipment>(StorageKey::Equipment.as_str(), id)
			.await
			.map_err(|e| not_found_or(e, id))?;

		let previous = current.value.status;
		let mut updated = current.value.clone();
		updated.status = status;
		updated.updated_at = current_timestamp();

		let mut batch = WriteBatch::new();
		batch.replace(&current, &updated)?;
		self.commit_replace(batch, id).await?;

		tracing::info!(
			item_id = %id,
			previous = previous.as_str(),
			current = status.as_str(),
			"Equipment status set"
		);
		Ok(previous)
	}

	async fn commit_replace(&self, batch: WriteBatch, id: &str) -> Result<(), CatalogError> {
		match self.storage.commit(batch).await {
			Ok(()) => Ok(()),
			Err(StorageError::Conflict(_)) => Err(CatalogError::Conflict(id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// The category label table.
	pub fn list_categories(&self) -> Vec<CategoryInfo> {
		EquipmentCategory::ALL
			.into_iter()
			.map(CategoryInfo::from)
			.collect()
	}

	/// Stock figures over the whole catalog.
	///
	/// Low stock counts products with `0 < quantity < low_stock_threshold`.
	pub async fn inventory_summary(
		&self,
		low_stock_threshold: u32,
	) -> Result<InventorySummary, CatalogError> {
		let products: Vec<StockProduct> =
			self.storage.list(StorageKey::Products.as_str()).await?;
		let equipment: Vec<UniqueEquipment> =
			self.storage.list(StorageKey::Equipment.as_str()).await?;

		let categories: HashSet<&str> = products
			.iter()
			.map(|p| p.category_id.as_str())
			.chain(equipment.iter().map(|e| e.category_id.as_str()))
			.collect();

		let stock_value: Decimal = products
			.iter()
			.map(|p| p.unit_price * Decimal::from(p.quantity_available))
			.sum();
		let equipment_value: Decimal = equipment
			.iter()
			.filter(|e| e.status == EquipmentStatus::Active)
			.map(|e| e.unit_price)
			.sum();

		Ok(InventorySummary {
			total_products: products.len(),
			total_equipment: equipment.len(),
			total_categories: categories.len(),
			total_value: stock_value + equipment_value,
			low_stock_items: products
				.iter()
				.filter(|p| p.quantity_available > 0 && p.quantity_available < low_stock_threshold)
				.count(),
			out_of_stock_items: products
				.iter()
				.filter(|p| p.quantity_available == 0)
				.count(),
		})
	}
}

fn validate_common(id: &str, name: &str, code: &str, price: Decimal) -> Result<(), CatalogError> {
	if id.trim().is_empty() {
		return Err(CatalogError::Validation("id is required".into()));
	}
	if name.trim().is_empty() {
		return Err(CatalogError::Validation("name is required".into()));
	}
	if code.trim().is_empty() {
		return Err(CatalogError::Validation("sku/serial number is required".into()));
	}
	if price.is_sign_negative() {
		return Err(CatalogError::Validation("unit price cannot be negative".into()));
	}
	Ok(())
}

fn not_found_or(err: StorageError, id: &str) -> CatalogError {
	match err {
		StorageError::NotFound => CatalogError::NotFound(id.to_string()),
		other => other.into(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use inventory_storage::implementations::memory::MemoryStorage;

	fn product(id: &str, name: &str, category: &str, quantity: u32) -> StockProduct {
		StockProduct {
			id: id.into(),
			name: name.into(),
			sku: format!("SKU-{}", id),
			category_id: category.into(),
			description: None,
			unit_price: Decimal::new(100, 0),
			cost: None,
			supplier: None,
			quantity_available: quantity,
			updated_at: 0,
		}
	}

	fn equipment(id: &str, name: &str, status: EquipmentStatus) -> UniqueEquipment {
		UniqueEquipment {
			id: id.into(),
			name: name.into(),
			serial_number: format!("SN-{}", id),
			model: "M1".into(),
			category_id: "server".into(),
			description: None,
			unit_price: Decimal::new(5000, 0),
			status,
			location_id: None,
			updated_at: 0,
		}
	}

	async fn seeded() -> CatalogService {
		let catalog = CatalogService::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))));
		catalog
			.register_product(product("p1", "Cabo de rede", "network", 10))
			.await
			.unwrap();
		catalog
			.register_product(product("p2", "Switch", "network", 0))
			.await
			.unwrap();
		catalog
			.register_product(product("p3", "Disco SSD", "storage", 3))
			.await
			.unwrap();
		catalog
			.register_equipment(equipment("e1", "Servidor Dell", EquipmentStatus::Active))
			.await
			.unwrap();
		catalog
			.register_equipment(equipment("e2", "Servidor HP", EquipmentStatus::Maintenance))
			.await
			.unwrap();
		catalog
	}

	#[tokio::test]
	async fn test_orderable_excludes_unavailable_and_sorts_by_name() {
		let catalog = seeded().await;
		let items = catalog.list_orderable(&CatalogFilter::default()).await.unwrap();
		let ids: Vec<&str> = items.iter().map(|i| i.id()).collect();
		assert_eq!(ids, vec!["p1", "p3", "e1"]);
	}

	#[tokio::test]
	async fn test_filters_combine() {
		let catalog = seeded().await;

		let network = catalog
			.list_orderable(&CatalogFilter {
				category: Some("network".into()),
				..Default::default()
			})
			.await
			.unwrap();
		assert_eq!(network.len(), 1);
		assert_eq!(network[0].id(), "p1");

		let by_serial = catalog
			.list_orderable(&CatalogFilter {
				search: Some("sn-E1".into()),
				..Default::default()
			})
			.await
			.unwrap();
		assert_eq!(by_serial.len(), 1);
		assert_eq!(by_serial[0].id(), "e1");

		let equipment_only = catalog
			.list_orderable(&CatalogFilter {
				kind: Some(CatalogItemKind::Equipment),
				..Default::default()
			})
			.await
			.unwrap();
		assert!(equipment_only.iter().all(|i| i.is_unique()));
	}

	#[tokio::test]
	async fn test_ids_are_unique_across_kinds() {
		let catalog = seeded().await;
		let result = catalog
			.register_equipment(equipment("p1", "Clash", EquipmentStatus::Active))
			.await;
		assert!(matches!(result, Err(CatalogError::AlreadyExists(id)) if id == "p1"));

		let result = catalog
			.register_product(product("p1", "Again", "network", 1))
			.await;
		assert!(matches!(result, Err(CatalogError::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn test_concurrent_registrations_of_one_id_across_kinds() {
		let catalog = seeded().await;
		let (as_product, as_equipment) = tokio::join!(
			catalog.register_product(product("dup", "Dup", "network", 1)),
			catalog.register_equipment(equipment("dup", "Dup", EquipmentStatus::Active)),
		);
		assert!(as_product.is_ok() != as_equipment.is_ok());

		let item = catalog.get_item("dup").await.unwrap();
		let expected = if as_product.is_ok() {
			CatalogItemKind::Product
		} else {
			CatalogItemKind::Equipment
		};
		assert_eq!(item.kind(), expected);
	}

	#[tokio::test]
	async fn test_get_item_and_maintenance() {
		let catalog = seeded().await;
		assert!(matches!(
			catalog.get_item("missing").await,
			Err(CatalogError::NotFound(_))
		));

		assert_eq!(catalog.set_product_stock("p2", 4).await.unwrap(), 0);
		assert_eq!(catalog.get_item("p2").await.unwrap().available_quantity(), 4);

		let previous = catalog
			.set_equipment_status("e2", EquipmentStatus::Active)
			.await
			.unwrap();
		assert_eq!(previous, EquipmentStatus::Maintenance);
		assert_eq!(catalog.get_item("e2").await.unwrap().available_quantity(), 1);
	}

	#[tokio::test]
	async fn test_negative_price_rejected() {
		let catalog = seeded().await;
		let mut bad = product("p9", "Bad", "other", 1);
		bad.unit_price = Decimal::new(-1, 0);
		assert!(matches!(
			catalog.register_product(bad).await,
			Err(CatalogError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_inventory_summary() {
		let catalog = seeded().await;
		let summary = catalog.inventory_summary(5).await.unwrap();
		assert_eq!(summary.total_products, 3);
		assert_eq!(summary.total_equipment, 2);
		assert_eq!(summary.total_categories, 3);
		assert_eq!(summary.low_stock_items, 1);
		assert_eq!(summary.out_of_stock_items, 1);
		// 10*100 + 3*100 + one active server at 5000
		assert_eq!(summary.total_value, Decimal::new(6300, 0));
	}

	#[test]
	fn test_categories_listed_with_labels() {
		let catalog = CatalogService::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))));
		let categories = catalog.list_categories();
		assert_eq!(categories.len(), 4);
		assert_eq!(categories[0].label, "Servidor");
	}
}
