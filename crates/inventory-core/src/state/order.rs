//! Approval state machine.
//!
//! Orders move pending_approval -> approved -> shipping -> completed, or end in
//! rejected or cancelled straight from pending_approval. Every transition is a
//! compare-and-swap on the order record, so two concurrent decisions on the
//! same order cannot both win. Approval additionally decrements product stock
//! and allocates equipment in the same atomic batch.

use crate::engine::event_bus::EventBus;
use inventory_catalog::namespace_for;
use inventory_identity::IdentityService;
use inventory_storage::{QueryFilter, StorageError, StorageService, Versioned, WriteBatch};
use inventory_types::{
	current_timestamp, truncate_id, CatalogEvent, CatalogItemKind, EquipmentStatus,
	InventoryEvent, Order, OrderEvent, OrderItem, OrderStatus, StockProduct, StorageKey,
	UniqueEquipment,
};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("User {0} is not allowed to decide on orders")]
	PermissionDenied(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// Approval would drive a product's stock below zero.
	#[error("Insufficient stock for {item_id}: {available} available, {requested} requested")]
	InsufficientStock {
		item_id: String,
		available: u32,
		requested: u32,
	},
	/// A referenced catalog item is gone or no longer active.
	#[error("Catalog item unavailable: {0}")]
	ItemUnavailable(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The order has no items, typically a failed submission.
	#[error("Order {0} has no items")]
	OrderIncomplete(String),
	/// Concurrent writers kept changing the records this transition touches.
	#[error("Order {0} could not be updated due to concurrent changes")]
	Conflict(String),
	#[error("Identity error: {0}")]
	Identity(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl OrderStateError {
	fn from_storage(err: StorageError) -> Self {
		OrderStateError::Storage(err.to_string())
	}
}

/// Checks if a state transition is valid.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	// Static transition table - each state maps to allowed next states
	static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			OrderStatus::PendingApproval,
			HashSet::from([
				OrderStatus::Approved,
				OrderStatus::Rejected,
				OrderStatus::Cancelled,
			]),
		);
		m.insert(OrderStatus::Approved, HashSet::from([OrderStatus::Shipping]));
		m.insert(OrderStatus::Shipping, HashSet::from([OrderStatus::Completed]));
		m.insert(OrderStatus::Rejected, HashSet::new()); // terminal
		m.insert(OrderStatus::Completed, HashSet::new()); // terminal
		m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
		m
	});

	TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
}

/// Outcome of one attempt at a transition.
type Attempt<T> = Result<T, OrderStateError>;

/// Administrator-driven order lifecycle.
pub struct ApprovalStateMachine {
	storage: Arc<StorageService>,
	identity: Arc<IdentityService>,
	event_bus: EventBus,
	max_attempts: u32,
}

impl ApprovalStateMachine {
	pub fn new(
		storage: Arc<StorageService>,
		identity: Arc<IdentityService>,
		event_bus: EventBus,
		max_retries: u32,
	) -> Self {
		Self {
			storage,
			identity,
			event_bus,
			max_attempts: max_retries.max(1),
		}
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::from_storage(other),
			})
	}

	/// Approves a pending order and commits its stock.
	///
	/// The order and every catalog record it references are written in one
	/// batch: either all stock is decremented and the order is approved, or
	/// nothing changes.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn approve(&self, order_id: &str, acting_user: &str) -> Result<Order, OrderStateError> {
		self.require_admin(acting_user).await?;

		let (order, catalog_events) = self
			.with_retries(order_id, move || self.try_approve(order_id, acting_user))
			.await?;

		tracing::info!(
			approved_by = %acting_user,
			total = %order.total_amount,
			"Order approved"
		);
		self.event_bus
			.publish(InventoryEvent::Order(OrderEvent::Approved {
				order_id: order.id.clone(),
				approved_by: acting_user.to_string(),
			}))
			.ok();
		for event in catalog_events {
			self.event_bus.publish(InventoryEvent::Catalog(event)).ok();
		}

		Ok(order)
	}

	/// Rejects a pending order. Nothing was reserved, so stock is untouched.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn reject(
		&self,
		order_id: &str,
		acting_user: &str,
		reason: Option<String>,
	) -> Result<Order, OrderStateError> {
		self.require_admin(acting_user).await?;
		let order = self
			.update_order_with(order_id, OrderStatus::Rejected, |o| {
				o.decision_note = reason.clone();
			})
			.await?;

		tracing::info!(rejected_by = %acting_user, "Order rejected");
		self.event_bus
			.publish(InventoryEvent::Order(OrderEvent::Rejected {
				order_id: order.id.clone(),
				rejected_by: acting_user.to_string(),
				reason,
			}))
			.ok();
		Ok(order)
	}

	/// Withdraws a pending order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		order_id: &str,
		acting_user: &str,
		reason: Option<String>,
	) -> Result<Order, OrderStateError> {
		self.require_admin(acting_user).await?;
		let order = self
			.update_order_with(order_id, OrderStatus::Cancelled, |o| {
				o.decision_note = reason.clone();
			})
			.await?;

		tracing::info!(cancelled_by = %acting_user, "Order cancelled");
		self.event_bus
			.publish(InventoryEvent::Order(OrderEvent::Cancelled {
				order_id: order.id.clone(),
				cancelled_by: acting_user.to_string(),
				reason,
			}))
			.ok();
		Ok(order)
	}

	/// Moves an approved order to shipping.
	pub async fn mark_shipping(
		&self,
		order_id: &str,
		acting_user: &str,
	) -> Result<Order, OrderStateError> {
		self.advance(order_id, acting_user, OrderStatus::Approved, OrderStatus::Shipping)
			.await
	}

	/// Moves a shipping order to completed.
	pub async fn mark_completed(
		&self,
		order_id: &str,
		acting_user: &str,
	) -> Result<Order, OrderStateError> {
		self.advance(order_id, acting_user, OrderStatus::Shipping, OrderStatus::Completed)
			.await
	}

	async fn advance(
		&self,
		order_id: &str,
		acting_user: &str,
		from: OrderStatus,
		to: OrderStatus,
	) -> Result<Order, OrderStateError> {
		self.require_admin(acting_user).await?;
		let order = self.update_order_with(order_id, to, |_| {}).await?;

		tracing::info!(
			order_id = %truncate_id(order_id),
			status = %to,
			"Order status changed"
		);
		self.event_bus
			.publish(InventoryEvent::Order(OrderEvent::StatusChanged {
				order_id: order.id.clone(),
				from,
				to,
			}))
			.ok();
		Ok(order)
	}

	async fn require_admin(&self, acting_user: &str) -> Result<(), OrderStateError> {
		let is_admin = self
			.identity
			.is_admin(acting_user)
			.await
			.map_err(|e| OrderStateError::Identity(e.to_string()))?;
		if !is_admin {
			tracing::warn!(user = %acting_user, "Rejected order decision from non-admin");
			return Err(OrderStateError::PermissionDenied(acting_user.to_string()));
		}
		Ok(())
	}

	/// Runs `attempt` until it stops failing with a conflict.
	async fn with_retries<T, F, Fut>(&self, order_id: &str, mut attempt: F) -> Attempt<T>
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = Attempt<T>>,
	{
		for n in 1..=self.max_attempts {
			match attempt().await {
				Err(OrderStateError::Conflict(key)) => {
					tracing::debug!(attempt = n, key = %key, "Concurrent write, retrying");
				},
				other => return other,
			}
		}
		tracing::warn!(
			order_id = %truncate_id(order_id),
			attempts = self.max_attempts,
			"Giving up after repeated conflicts"
		);
		Err(OrderStateError::Conflict(order_id.to_string()))
	}

	/// Applies `updater` and moves the order to `to`, validating the transition.
	async fn update_order_with<F>(
		&self,
		order_id: &str,
		to: OrderStatus,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: Fn(&mut Order),
	{
		let updater = &updater;
		self.with_retries(order_id, move || async move {
			let current = self.load_order(order_id).await?;
			let mut order = current.value.clone();
			ensure_transition(order.status, to)?;

			updater(&mut order);
			order.status = to;
			order.updated_at = current_timestamp();

			let mut batch = WriteBatch::new();
			batch
				.replace(&current, &order)
				.map_err(OrderStateError::from_storage)?;
			self.commit(batch).await?;
			Ok(order)
		})
		.await
	}

	async fn try_approve(
		&self,
		order_id: &str,
		acting_user: &str,
	) -> Attempt<(Order, Vec<CatalogEvent>)> {
		let current = self.load_order(order_id).await?;
		ensure_transition(current.value.status, OrderStatus::Approved)?;

		let items: Vec<OrderItem> = self
			.storage
			.query(
				StorageKey::OrderItems.as_str(),
				&[QueryFilter::eq("order_id", order_id)],
			)
			.await
			.map_err(OrderStateError::from_storage)?;
		if items.is_empty() {
			return Err(OrderStateError::OrderIncomplete(order_id.to_string()));
		}

		// Same catalog item on several lines is decremented once
		let mut requested: BTreeMap<(&str, CatalogItemKind), u32> = BTreeMap::new();
		for item in &items {
			*requested
				.entry((item.catalog_item_id.as_str(), item.item_kind))
				.or_default() += item.quantity;
		}

		let now = current_timestamp();
		let mut batch = WriteBatch::new();
		let mut events = Vec::with_capacity(requested.len());

		for ((item_id, kind), quantity) in requested {
			match kind {
				CatalogItemKind::Product => {
					let record: Versioned<StockProduct> =
						self.load_catalog_record(kind, item_id).await?;
					let available = record.value.quantity_available;
					if available < quantity {
						return Err(OrderStateError::InsufficientStock {
							item_id: item_id.to_string(),
							available,
							requested: quantity,
						});
					}
					let mut product = record.value.clone();
					product.quantity_available = available - quantity;
					product.updated_at = now;
					batch
						.replace(&record, &product)
						.map_err(OrderStateError::from_storage)?;
					events.push(CatalogEvent::StockChanged {
						item_id: item_id.to_string(),
						previous: available,
						current: product.quantity_available,
					});
				},
				CatalogItemKind::Equipment => {
					let record: Versioned<UniqueEquipment> =
						self.load_catalog_record(kind, item_id).await?;
					if record.value.status != EquipmentStatus::Active || quantity != 1 {
						return Err(OrderStateError::ItemUnavailable(item_id.to_string()));
					}
					let mut equipment = record.value.clone();
					equipment.status = EquipmentStatus::Allocated;
					equipment.updated_at = now;
					batch
						.replace(&record, &equipment)
						.map_err(OrderStateError::from_storage)?;
					events.push(CatalogEvent::EquipmentStatusChanged {
						item_id: item_id.to_string(),
						previous: EquipmentStatus::Active,
						current: EquipmentStatus::Allocated,
					});
				},
			}
		}

		let mut order = current.value.clone();
		order.status = OrderStatus::Approved;
		order.approved_by = Some(acting_user.to_string());
		order.approved_at = Some(now);
		order.updated_at = now;
		batch
			.replace(&current, &order)
			.map_err(OrderStateError::from_storage)?;

		self.commit(batch).await?;
		Ok((order, events))
	}

	async fn load_order(&self, order_id: &str) -> Attempt<Versioned<Order>> {
		self.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::from_storage(other),
			})
	}

	async fn load_catalog_record<T: serde::de::DeserializeOwned>(
		&self,
		kind: CatalogItemKind,
		item_id: &str,
	) -> Attempt<Versioned<T>> {
		self.storage
			.retrieve_versioned(namespace_for(kind), item_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::ItemUnavailable(item_id.to_string()),
				other => OrderStateError::from_storage(other),
			})
	}

	async fn commit(&self, batch: WriteBatch) -> Attempt<()> {
		self.storage.commit(batch).await.map_err(|e| match e {
			StorageError::Conflict(key) => OrderStateError::Conflict(key),
			other => OrderStateError::from_storage(other),
		})
	}
}

fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Attempt<()> {
	if is_valid_transition(from, to) {
		Ok(())
	} else {
		Err(OrderStateError::InvalidTransition { from, to })
	}
}
