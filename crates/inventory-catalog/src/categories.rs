//! Category label table.

use serde::{Deserialize, Serialize};

/// Known equipment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentCategory {
	Server,
	Network,
	Storage,
	Other,
}

impl EquipmentCategory {
	pub const ALL: [EquipmentCategory; 4] = [
		EquipmentCategory::Server,
		EquipmentCategory::Network,
		EquipmentCategory::Storage,
		EquipmentCategory::Other,
	];

	pub fn id(&self) -> &'static str {
		match self {
			EquipmentCategory::Server => "server",
			EquipmentCategory::Network => "network",
			EquipmentCategory::Storage => "storage",
			EquipmentCategory::Other => "other",
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			EquipmentCategory::Server => "Servidor",
			EquipmentCategory::Network => "Equipamento de Rede",
			EquipmentCategory::Storage => "Armazenamento",
			EquipmentCategory::Other => "Outro",
		}
	}

	pub fn from_id(id: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|c| c.id() == id)
	}
}

/// Display label for a category id; unknown ids render as themselves.
pub fn category_label(category_id: &str) -> &str {
	EquipmentCategory::from_id(category_id)
		.map(|c| c.label())
		.unwrap_or(category_id)
}

/// A category as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
	pub id: String,
	pub label: String,
}

impl From<EquipmentCategory> for CategoryInfo {
	fn from(category: EquipmentCategory) -> Self {
		Self {
			id: category.id().to_string(),
			label: category.label().to_string(),
		}
	}
}
