//! Catalog endpoints.
//!
//! Browsing is open to every caller; changes to the catalog require an
//! administrator.

use super::ToApiError;
use inventory_catalog::{CatalogFilter, CategoryInfo};
use inventory_core::InventoryEngine;
use inventory_types::{
	APIError, CatalogItem, CatalogQuery, EquipmentStatus, InventorySummary, StockProduct,
	UniqueEquipment,
};
use tracing::info;

/// Lists items that can currently be ordered.
pub async fn list_catalog(
	engine: &InventoryEngine,
	query: CatalogQuery,
) -> Result<Vec<CatalogItem>, APIError> {
	let filter = CatalogFilter {
		category: query.category,
		search: query.search,
		kind: query.kind,
	};
	engine
		.catalog()
		.list_orderable(&filter)
		.await
		.map_err(ToApiError::into_api_error)
}

pub fn list_categories(engine: &InventoryEngine) -> Vec<CategoryInfo> {
	engine.catalog().list_categories()
}

/// Stock figures using the configured low stock threshold.
pub async fn inventory_summary(engine: &InventoryEngine) -> Result<InventorySummary, APIError> {
	engine
		.catalog()
		.inventory_summary(engine.config().orders.low_stock_threshold)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn register_product(
	engine: &InventoryEngine,
	user: &str,
	product: StockProduct,
) -> Result<StockProduct, APIError> {
	info!(user = %user, item_id = %product.id, "Registering product");
	engine
		.register_product(user, product)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn register_equipment(
	engine: &InventoryEngine,
	user: &str,
	equipment: UniqueEquipment,
) -> Result<UniqueEquipment, APIError> {
	info!(user = %user, item_id = %equipment.id, "Registering equipment");
	engine
		.register_equipment(user, equipment)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn set_product_stock(
	engine: &InventoryEngine,
	user: &str,
	item_id: &str,
	quantity: u32,
) -> Result<CatalogItem, APIError> {
	engine
		.set_product_stock(user, item_id, quantity)
		.await
		.map_err(ToApiError::into_api_error)?;
	engine
		.catalog()
		.get_item(item_id)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn set_equipment_status(
	engine: &InventoryEngine,
	user: &str,
	item_id: &str,
	status: EquipmentStatus,
) -> Result<CatalogItem, APIError> {
	engine
		.set_equipment_status(user, item_id, status)
		.await
		.map_err(ToApiError::into_api_error)?;
	engine
		.catalog()
		.get_item(item_id)
		.await
		.map_err(ToApiError::into_api_error)
}
