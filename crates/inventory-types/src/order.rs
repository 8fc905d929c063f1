//! Order types for the requisition workflow.
//!
//! This module defines persisted orders, their immutable line items and the
//! aggregate summaries computed for dashboards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CatalogItemKind;

/// A durable customer request for a set of catalog items.
///
/// Orders are created in [`OrderStatus::PendingApproval`] and move through
/// the approval state machine. The total is a snapshot taken at submission
/// time and never recomputed from live catalog prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Name of the requesting customer.
	pub customer_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_email: Option<String>,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Sum of quantity times unit price over all items.
	pub total_amount: Decimal,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
	/// User who approved the order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub approved_by: Option<String>,
	/// Timestamp of the approval.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub approved_at: Option<u64>,
	/// User who submitted the order, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub submitted_by: Option<String>,
	/// Client-supplied token used to deduplicate resubmissions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub submission_token: Option<String>,
	/// Reason recorded with a rejection or cancellation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub decision_note: Option<String>,
}

/// Status of an order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Waiting for an administrator decision.
	PendingApproval,
	/// Approved; stock has been committed.
	Approved,
	/// Rejected by an administrator.
	Rejected,
	/// Items are on their way to the requester.
	Shipping,
	/// Delivered.
	Completed,
	/// Withdrawn before a decision was made.
	Cancelled,
}

impl OrderStatus {
	/// Returns the string stored in persisted records.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::PendingApproval => "pending_approval",
			OrderStatus::Approved => "approved",
			OrderStatus::Rejected => "rejected",
			OrderStatus::Shipping => "shipping",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Human readable label used by the order views.
	pub fn label(&self) -> &'static str {
		match self {
			OrderStatus::PendingApproval => "Aguardando Aprovação",
			OrderStatus::Approved => "Aprovado",
			OrderStatus::Rejected => "Rejeitado",
			OrderStatus::Shipping => "Enviando",
			OrderStatus::Completed => "Concluído",
			OrderStatus::Cancelled => "Cancelado",
		}
	}

	/// Whether no further transition is defined out of this status.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Rejected | OrderStatus::Completed | OrderStatus::Cancelled
		)
	}

	/// Whether stock has been committed for orders in this status.
	pub fn has_committed_stock(&self) -> bool {
		matches!(
			self,
			OrderStatus::Approved | OrderStatus::Shipping | OrderStatus::Completed
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending_approval" => Ok(Self::PendingApproval),
			"approved" => Ok(Self::Approved),
			"rejected" => Ok(Self::Rejected),
			"shipping" => Ok(Self::Shipping),
			"completed" => Ok(Self::Completed),
			"cancelled" => Ok(Self::Cancelled),
			other => Err(format!("Unknown order status: {}", other)),
		}
	}
}

/// One line of an order, frozen at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
	pub id: String,
	/// Parent order.
	pub order_id: String,
	/// Referenced catalog item (not owned).
	pub catalog_item_id: String,
	pub item_kind: CatalogItemKind,
	/// Item name at submission time.
	pub name: String,
	/// SKU or serial number at submission time.
	pub code: String,
	pub quantity: u32,
	/// Unit price snapshot.
	pub unit_price: Decimal,
	pub created_at: u64,
}

impl OrderItem {
	/// Quantity times unit price.
	pub fn subtotal(&self) -> Decimal {
		self.unit_price * Decimal::from(self.quantity)
	}
}

/// An order together with its items, as shown in the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithItems {
	#[serde(flatten)]
	pub order: Order,
	pub items: Vec<OrderItem>,
}

impl OrderWithItems {
	/// Total number of units across all items.
	pub fn unit_count(&self) -> u64 {
		self.items.iter().map(|i| u64::from(i.quantity)).sum()
	}
}

/// Aggregate figures over all orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
	/// Number of valid orders.
	pub total: usize,
	/// Orders waiting for approval.
	pub pending: usize,
	/// Units in orders whose stock has been committed.
	pub items_sold: u64,
	/// Value of orders whose stock has been committed.
	pub approved_value: Decimal,
}

/// Aggregate figures over the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
	pub total_products: usize,
	pub total_equipment: usize,
	pub total_categories: usize,
	/// Stock value at sale price, plus active equipment.
	pub total_value: Decimal,
	/// Products with stock below the configured threshold but not zero.
	pub low_stock_items: usize,
	pub out_of_stock_items: usize,
}
