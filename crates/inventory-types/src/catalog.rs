//! Catalog types for orderable items.
//!
//! A catalog item is either a replenishable stock product or a unique,
//! non-fungible piece of equipment. Quantity semantics differ between the two
//! and are exposed through [`CatalogItem::max_quantity`] rather than by
//! comparing type strings at call sites.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A replenishable product counted in units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockProduct {
	/// Unique identifier of the product.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Stock keeping unit.
	pub sku: String,
	/// Category identifier (see the catalog label table).
	pub category_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Sale price per unit.
	pub unit_price: Decimal,
	/// Acquisition cost per unit, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cost: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub supplier: Option<String>,
	/// Units currently in stock.
	pub quantity_available: u32,
	/// Timestamp of the last change to this record.
	#[serde(default)]
	pub updated_at: u64,
}

/// Lifecycle status of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
	/// In service and available to be requested.
	Active,
	/// Temporarily out of service.
	Maintenance,
	/// Decommissioned or stored.
	Inactive,
	/// Claimed by an approved order.
	Allocated,
}

impl EquipmentStatus {
	/// Returns the string stored in persisted records.
	pub fn as_str(&self) -> &'static str {
		match self {
			EquipmentStatus::Active => "active",
			EquipmentStatus::Maintenance => "maintenance",
			EquipmentStatus::Inactive => "inactive",
			EquipmentStatus::Allocated => "allocated",
		}
	}

	/// Human readable label.
	pub fn label(&self) -> &'static str {
		match self {
			EquipmentStatus::Active => "Ativo",
			EquipmentStatus::Maintenance => "Em Manutenção",
			EquipmentStatus::Inactive => "Inativo",
			EquipmentStatus::Allocated => "Alocado",
		}
	}
}

/// A unique equipment asset, tracked by serial number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueEquipment {
	/// Unique identifier of the equipment.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Manufacturer serial number.
	pub serial_number: String,
	pub model: String,
	/// Category identifier (see the catalog label table).
	pub category_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Price charged when the equipment is requested.
	pub unit_price: Decimal,
	/// Current lifecycle status.
	pub status: EquipmentStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location_id: Option<String>,
	/// Timestamp of the last change to this record.
	#[serde(default)]
	pub updated_at: u64,
}

/// Discriminant of a [`CatalogItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogItemKind {
	Product,
	Equipment,
}

impl fmt::Display for CatalogItemKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CatalogItemKind::Product => write!(f, "product"),
			CatalogItemKind::Equipment => write!(f, "equipment"),
		}
	}
}

/// Any orderable thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogItem {
	Product(StockProduct),
	Equipment(UniqueEquipment),
}

impl CatalogItem {
	pub fn id(&self) -> &str {
		match self {
			CatalogItem::Product(p) => &p.id,
			CatalogItem::Equipment(e) => &e.id,
		}
	}

	pub fn name(&self) -> &str {
		match self {
			CatalogItem::Product(p) => &p.name,
			CatalogItem::Equipment(e) => &e.name,
		}
	}

	/// SKU for products, serial number for equipment.
	pub fn code(&self) -> &str {
		match self {
			CatalogItem::Product(p) => &p.sku,
			CatalogItem::Equipment(e) => &e.serial_number,
		}
	}

	pub fn category_id(&self) -> &str {
		match self {
			CatalogItem::Product(p) => &p.category_id,
			CatalogItem::Equipment(e) => &e.category_id,
		}
	}

	pub fn unit_price(&self) -> Decimal {
		match self {
			CatalogItem::Product(p) => p.unit_price,
			CatalogItem::Equipment(e) => e.unit_price,
		}
	}

	pub fn kind(&self) -> CatalogItemKind {
		match self {
			CatalogItem::Product(_) => CatalogItemKind::Product,
			CatalogItem::Equipment(_) => CatalogItemKind::Equipment,
		}
	}

	/// Units that can currently be requested.
	///
	/// Equipment is non-fungible: it is available exactly once while active
	/// and not at all otherwise.
	pub fn available_quantity(&self) -> u32 {
		match self {
			CatalogItem::Product(p) => p.quantity_available,
			CatalogItem::Equipment(e) if e.status == EquipmentStatus::Active => 1,
			CatalogItem::Equipment(_) => 0,
		}
	}

	/// Upper bound for a single cart line of this item.
	pub fn max_quantity(&self) -> u32 {
		match self {
			CatalogItem::Product(p) => p.quantity_available,
			CatalogItem::Equipment(_) => 1,
		}
	}

	pub fn is_unique(&self) -> bool {
		matches!(self, CatalogItem::Equipment(_))
	}
}

impl From<StockProduct> for CatalogItem {
	fn from(product: StockProduct) -> Self {
		CatalogItem::Product(product)
	}
}

impl From<UniqueEquipment> for CatalogItem {
	fn from(equipment: UniqueEquipment) -> Self {
		CatalogItem::Equipment(equipment)
	}
}
