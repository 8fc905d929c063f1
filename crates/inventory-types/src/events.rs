//! Event types for the inventory workflow.
//!
//! Events flow through the event bus so that other components (audit logging,
//! notification senders, dashboards) can react to workflow changes without the
//! workflow services knowing about them.

use crate::{EquipmentStatus, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all workflow events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InventoryEvent {
	/// Events from the order workflow.
	Order(OrderEvent),
	/// Events from the catalog.
	Catalog(CatalogEvent),
}

/// Events related to order processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A cart has been turned into a pending order.
	Submitted {
		order_id: String,
		total_amount: Decimal,
		item_count: usize,
	},
	/// An administrator approved the order and stock was committed.
	Approved { order_id: String, approved_by: String },
	/// An administrator rejected the order.
	Rejected {
		order_id: String,
		rejected_by: String,
		reason: Option<String>,
	},
	/// The order was withdrawn before a decision.
	Cancelled {
		order_id: String,
		cancelled_by: String,
		reason: Option<String>,
	},
	/// Any other status change (shipping, completion).
	StatusChanged {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
	},
}

/// Events related to catalog stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogEvent {
	/// Product stock changed.
	StockChanged {
		item_id: String,
		previous: u32,
		current: u32,
	},
	/// Equipment moved to a new status.
	EquipmentStatusChanged {
		item_id: String,
		previous: EquipmentStatus,
		current: EquipmentStatus,
	},
}
