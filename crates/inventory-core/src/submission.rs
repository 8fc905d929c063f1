//! Order submission service.
//!
//! Turns a non-empty cart plus customer identification into a pending order
//! and its items. The order record (together with the submission token claim,
//! when one is supplied) is written first and the items follow in a single
//! atomic batch. When the items cannot be written the order is rolled back,
//! or flagged as cancelled if even that fails, so that an order without items
//! is never offered for approval. Submission tokens are claimed per
//! submitter; a claim left behind by an incomplete order is released on the
//! next attempt.
//!
//! Submission has no inventory effect; stock is committed at approval.

use crate::cart::Cart;
use crate::engine::event_bus::EventBus;
use inventory_storage::{StorageError, StorageService, Versioned, WriteBatch};
use inventory_types::{
	current_timestamp, truncate_id, InventoryEvent, Order, OrderEvent, OrderItem, OrderStatus,
	StorageKey,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Note recorded on orders whose items could not be written.
pub const INCOMPLETE_SUBMISSION_NOTE: &str = "incomplete submission";

/// Errors that can occur while submitting an order.
#[derive(Debug, Error)]
pub enum SubmissionError {
	/// Missing customer name or empty cart.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The order record was written but its items were not.
	#[error("Order {order_id} could not be created completely (rolled back: {rolled_back}): {reason}")]
	OrderCreationPartialFailure {
		order_id: String,
		/// Whether the order record was removed again.
		rolled_back: bool,
		reason: String,
	},
	/// The store could not be reached; nothing was created and the
	/// submission can be retried.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Customer fields of a submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOrder {
	pub customer_name: String,
	pub customer_email: Option<String>,
	/// Client-chosen token that makes retries of the same submission safe.
	pub submission_token: Option<String>,
	/// Authenticated user submitting the order, when known.
	pub submitted_by: Option<String>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
	pub order_id: String,
	pub total_amount: Decimal,
	/// False when the token had already been used and the earlier order is
	/// returned instead of a new one.
	pub created: bool,
}

/// Service persisting carts as pending orders.
pub struct OrderSubmissionService {
	storage: Arc<StorageService>,
	event_bus: EventBus,
	token_ttl: Option<Duration>,
}

impl OrderSubmissionService {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self {
			storage,
			event_bus,
			token_ttl: None,
		}
	}

	/// Expires submission token claims after `ttl`.
	pub fn with_token_ttl(mut self, ttl: Option<Duration>) -> Self {
		self.token_ttl = ttl.filter(|t| !t.is_zero());
		self
	}

	/// Persists `cart` as a new pending order.
	///
	/// The cart is only borrowed; clearing it after success is up to the
	/// caller, and it is left untouched on failure.
	#[instrument(skip_all, fields(customer = %request.customer_name.trim(), lines = cart.len()))]
	pub async fn submit(
		&self,
		request: SubmitOrder,
		cart: &Cart,
	) -> Result<SubmissionReceipt, SubmissionError> {
		let customer_name = request.customer_name.trim();
		if customer_name.is_empty() {
			return Err(SubmissionError::Validation("name required".into()));
		}
		if cart.is_empty() {
			return Err(SubmissionError::Validation("cart empty".into()));
		}
		let token = request
			.submission_token
			.as_deref()
			.map(str::trim)
			.filter(|t| !t.is_empty());

		let now = current_timestamp();
		let order = Order {
			id: Uuid::new_v4().to_string(),
			customer_name: customer_name.to_string(),
			customer_email: request
				.customer_email
				.as_deref()
				.map(str::trim)
				.filter(|e| !e.is_empty())
				.map(str::to_string),
			status: OrderStatus::PendingApproval,
			total_amount: cart.total(),
			created_at: now,
			updated_at: now,
			approved_by: None,
			approved_at: None,
			submitted_by: request.submitted_by.clone(),
			submission_token: token.map(str::to_string),
			decision_note: None,
		};

		// Tokens are claimed per submitter, so equal keys from two users never meet
		let claim = token.map(|t| claim_key(request.submitted_by.as_deref(), t));

		let mut stale_released = false;
		loop {
			let header = self
				.header_batch(&order, claim.as_deref())
				.map_err(storage_error)?;
			match (self.storage.commit(header).await, claim.as_deref()) {
				(Ok(()), _) => break,
				(Err(StorageError::Conflict(_)), Some(claim)) => {
					if let Some(receipt) = self.replay(claim).await? {
						return Ok(receipt);
					}
					if stale_released {
						return Err(SubmissionError::Storage(
							"submission token is being claimed concurrently".into(),
						));
					}
					stale_released = true;
				},
				(Err(e), _) => return Err(storage_error(e)),
			}
		}

		let items: Vec<OrderItem> = cart
			.lines()
			.iter()
			.map(|line| OrderItem {
				id: Uuid::new_v4().to_string(),
				order_id: order.id.clone(),
				catalog_item_id: line.item().id().to_string(),
				item_kind: line.item().kind(),
				name: line.item().name().to_string(),
				code: line.item().code().to_string(),
				quantity: line.quantity(),
				unit_price: line.item().unit_price(),
				created_at: now,
			})
			.collect();

		if let Err(e) = self.write_items(&items).await {
			return Err(self.roll_back(&order, claim.as_deref(), e).await);
		}

		tracing::info!(
			order_id = %truncate_id(&order.id),
			total = %order.total_amount,
			items = items.len(),
			"Order submitted"
		);
		self.event_bus
			.publish(InventoryEvent::Order(OrderEvent::Submitted {
				order_id: order.id.clone(),
				total_amount: order.total_amount,
				item_count: items.len(),
			}))
			.ok();

		Ok(SubmissionReceipt {
			order_id: order.id,
			total_amount: order.total_amount,
			created: true,
		})
	}

	async fn write_items(&self, items: &[OrderItem]) -> Result<(), StorageError> {
		let mut batch = WriteBatch::new();
		for item in items {
			batch.insert(StorageKey::OrderItems.as_str(), &item.id, item)?;
		}
		self.storage.commit(batch).await
	}

	/// The order record plus, when given, the token claim pointing at it.
	fn header_batch(&self, order: &Order, claim: Option<&str>) -> Result<WriteBatch, StorageError> {
		let mut batch = WriteBatch::new();
		batch.insert(StorageKey::Orders.as_str(), &order.id, order)?;
		if let Some(claim) = claim {
			batch.insert_with_ttl(
				StorageKey::SubmissionTokens.as_str(),
				claim,
				&order.id,
				self.token_ttl,
			)?;
		}
		Ok(batch)
	}

	/// Returns the order an earlier submission with the same token created.
	///
	/// A claim whose order is gone, or was flagged as an incomplete
	/// submission, is released and `None` is returned so the caller can
	/// claim the token again.
	async fn replay(&self, claim: &str) -> Result<Option<SubmissionReceipt>, SubmissionError> {
		let claimed: Versioned<String> = match self
			.storage
			.retrieve_versioned(StorageKey::SubmissionTokens.as_str(), claim)
			.await
		{
			Ok(claimed) => claimed,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(storage_error(e)),
		};

		let order: Option<Order> = match self
			.storage
			.retrieve(StorageKey::Orders.as_str(), &claimed.value)
			.await
		{
			Ok(order) => Some(order),
			Err(StorageError::NotFound) => None,
			Err(e) => return Err(storage_error(e)),
		};

		match order {
			Some(order) if !is_incomplete(&order) => {
				tracing::info!(
					order_id = %truncate_id(&order.id),
					"Submission token already used, returning existing order"
				);
				Ok(Some(SubmissionReceipt {
					order_id: order.id,
					total_amount: order.total_amount,
					created: false,
				}))
			},
			_ => {
				tracing::warn!(
					order_id = %truncate_id(&claimed.value),
					"Releasing submission token of an incomplete order"
				);
				let mut batch = WriteBatch::new();
				batch.remove(&claimed);
				match self.storage.commit(batch).await {
					Ok(()) | Err(StorageError::Conflict(_)) => Ok(None),
					Err(e) => Err(storage_error(e)),
				}
			},
		}
	}

	/// Removes the order record and its token claim in one batch.
	async fn release(&self, order_id: &str, claim: Option<&str>) -> Result<(), StorageError> {
		let order: Versioned<Order> = self
			.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
			.await?;
		let mut batch = WriteBatch::new();
		batch.remove(&order);
		if let Some(claim) = claim {
			let claimed: Versioned<String> = self
				.storage
				.retrieve_versioned(StorageKey::SubmissionTokens.as_str(), claim)
				.await?;
			batch.remove(&claimed);
		}
		self.storage.commit(batch).await
	}

	/// Undoes a half-written submission and builds the error to report.
	async fn roll_back(
		&self,
		order: &Order,
		claim: Option<&str>,
		cause: StorageError,
	) -> SubmissionError {
		tracing::error!(
			order_id = %truncate_id(&order.id),
			error = %cause,
			"Failed to write order items, rolling back"
		);

		let rolled_back = match self.release(&order.id, claim).await {
			Ok(()) => true,
			Err(e) => {
				tracing::error!(
					order_id = %truncate_id(&order.id),
					error = %e,
					"Rollback failed, flagging order as incomplete"
				);
				let mut flagged = order.clone();
				flagged.status = OrderStatus::Cancelled;
				flagged.decision_note = Some(INCOMPLETE_SUBMISSION_NOTE.to_string());
				flagged.updated_at = current_timestamp();
				if let Err(e) = self
					.storage
					.update(StorageKey::Orders.as_str(), &order.id, &flagged)
					.await
				{
					tracing::error!(error = %e, "Failed to flag incomplete order");
				}
				false
			},
		};

		SubmissionError::OrderCreationPartialFailure {
			order_id: order.id.clone(),
			rolled_back,
			reason: cause.to_string(),
		}
	}
}

/// Storage id of a token claim, scoped to whoever submitted it.
fn claim_key(submitted_by: Option<&str>, token: &str) -> String {
	format!("{}:{}", submitted_by.unwrap_or("anonymous"), token)
}

/// Whether an order was flagged after its items could not be written.
fn is_incomplete(order: &Order) -> bool {
	order.status == OrderStatus::Cancelled
		&& order.decision_note.as_deref() == Some(INCOMPLETE_SUBMISSION_NOTE)
}

fn storage_error(err: StorageError) -> SubmissionError {
	SubmissionError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use inventory_storage::implementations::memory::MemoryStorage;
	use inventory_storage::{StorageInterface, SwapOp};
	use inventory_types::{
		CatalogItem, ConfigSchema, EquipmentStatus, StockProduct, UniqueEquipment,
	};
	use std::sync::atomic::{AtomicBool, Ordering};

	fn product(id: &str, stock: u32, price: Decimal) -> CatalogItem {
		CatalogItem::Product(StockProduct {
			id: id.into(),
			name: format!("Product {}", id),
			sku: format!("SKU-{}", id),
			category_id: "network".into(),
			description: None,
			unit_price: price,
			cost: None,
			supplier: None,
			quantity_available: stock,
			updated_at: 0,
		})
	}

	fn equipment(id: &str, price: Decimal) -> CatalogItem {
		CatalogItem::Equipment(UniqueEquipment {
			id: id.into(),
			name: format!("Equipment {}", id),
			serial_number: format!("SN-{}", id),
			model: "X".into(),
			category_id: "server".into(),
			description: None,
			unit_price: price,
			status: EquipmentStatus::Active,
			location_id: None,
			updated_at: 0,
		})
	}

	fn jane_cart() -> Cart {
		let mut cart = Cart::new();
		cart.add_item(&product("A", 3, Decimal::new(150, 0)), 2)
			.unwrap();
		cart.add_one(&equipment("B", Decimal::new(2000, 0))).unwrap();
		cart
	}

	fn jane() -> SubmitOrder {
		SubmitOrder {
			customer_name: "Jane".into(),
			..Default::default()
		}
	}

	fn service_over(backend: Box<dyn StorageInterface>) -> (OrderSubmissionService, Arc<StorageService>) {
		let storage = Arc::new(StorageService::new(backend));
		(
			OrderSubmissionService::new(storage.clone(), EventBus::new(16)),
			storage,
		)
	}

	async fn items_of(storage: &StorageService, order_id: &str) -> Vec<OrderItem> {
		storage
			.query(
				StorageKey::OrderItems.as_str(),
				&[inventory_storage::QueryFilter::eq("order_id", order_id)],
			)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_jane_order() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));
		let cart = jane_cart();

		let receipt = service.submit(jane(), &cart).await.unwrap();
		assert!(receipt.created);
		// 2 x 150 + 1 x 2000
		assert_eq!(receipt.total_amount, Decimal::new(2300, 0));

		let order: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &receipt.order_id)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::PendingApproval);
		assert_eq!(order.total_amount, cart.total());
		assert_eq!(order.customer_name, "Jane");

		let items = items_of(&storage, &receipt.order_id).await;
		assert_eq!(items.len(), 2);
		let sum: Decimal = items.iter().map(OrderItem::subtotal).sum();
		assert_eq!(sum, order.total_amount);

		// The caller still owns the cart
		assert_eq!(cart.len(), 2);
	}

	#[tokio::test]
	async fn test_validation_creates_nothing() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));

		let err = service.submit(jane(), &Cart::new()).await.unwrap_err();
		assert!(matches!(err, SubmissionError::Validation(m) if m == "cart empty"));

		let blank = SubmitOrder {
			customer_name: "   ".into(),
			..Default::default()
		};
		let err = service.submit(blank, &jane_cart()).await.unwrap_err();
		assert!(matches!(err, SubmissionError::Validation(m) if m == "name required"));

		let orders: Vec<Order> = storage.list(StorageKey::Orders.as_str()).await.unwrap();
		assert!(orders.is_empty());
	}

	#[tokio::test]
	async fn test_blank_email_is_dropped() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));
		let request = SubmitOrder {
			customer_name: " Jane ".into(),
			customer_email: Some("  ".into()),
			..Default::default()
		};
		let receipt = service.submit(request, &jane_cart()).await.unwrap();
		let order: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &receipt.order_id)
			.await
			.unwrap();
		assert_eq!(order.customer_name, "Jane");
		assert_eq!(order.customer_email, None);
	}

	#[tokio::test]
	async fn test_resubmission_with_same_token_is_idempotent() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));
		let request = SubmitOrder {
			submission_token: Some("tok-1".into()),
			..jane()
		};

		let first = service.submit(request.clone(), &jane_cart()).await.unwrap();
		let second = service.submit(request, &jane_cart()).await.unwrap();

		assert!(first.created);
		assert!(!second.created);
		assert_eq!(first.order_id, second.order_id);

		let orders: Vec<Order> = storage.list(StorageKey::Orders.as_str()).await.unwrap();
		assert_eq!(orders.len(), 1);
		assert_eq!(items_of(&storage, &first.order_id).await.len(), 2);
	}

	/// Faults a [`FailingItems`] backend injects, switchable mid-test.
	#[derive(Default)]
	struct Faults {
		items: AtomicBool,
		removals: AtomicBool,
	}

	/// Memory backend that can refuse order item writes and batched removals.
	struct FailingItems {
		inner: MemoryStorage,
		faults: Arc<Faults>,
	}

	#[async_trait]
	impl StorageInterface for FailingItems {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(
			&self,
			key: &str,
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value, ttl).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(prefix).await
		}

		async fn swap_batch(&self, ops: Vec<SwapOp>) -> Result<(), StorageError> {
			let items = self.faults.items.load(Ordering::SeqCst)
				&& ops.iter().any(|op| op.key.starts_with("order_items:"));
			let removals = self.faults.removals.load(Ordering::SeqCst)
				&& ops.iter().any(|op| op.new.is_none());
			if items || removals {
				return Err(StorageError::Backend("connection reset".into()));
			}
			self.inner.swap_batch(ops).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	fn faulty_service(
		items: bool,
		removals: bool,
	) -> (OrderSubmissionService, Arc<StorageService>, Arc<Faults>) {
		let faults = Arc::new(Faults::default());
		faults.items.store(items, Ordering::SeqCst);
		faults.removals.store(removals, Ordering::SeqCst);
		let (service, storage) = service_over(Box::new(FailingItems {
			inner: MemoryStorage::new(),
			faults: faults.clone(),
		}));
		(service, storage, faults)
	}

	#[tokio::test]
	async fn test_item_failure_rolls_back_order_and_token() {
		let (service, storage, faults) = faulty_service(true, false);
		let request = SubmitOrder {
			submission_token: Some("tok-2".into()),
			..jane()
		};

		let err = service.submit(request.clone(), &jane_cart()).await.unwrap_err();
		let SubmissionError::OrderCreationPartialFailure {
			order_id,
			rolled_back,
			..
		} = err
		else {
			panic!("expected partial failure, got {:?}", err);
		};
		assert!(rolled_back);
		assert!(!storage
			.exists(StorageKey::Orders.as_str(), &order_id)
			.await
			.unwrap());
		assert!(!storage
			.exists(
				StorageKey::SubmissionTokens.as_str(),
				&claim_key(None, "tok-2")
			)
			.await
			.unwrap());

		faults.items.store(false, Ordering::SeqCst);
		let retried = service.submit(request, &jane_cart()).await.unwrap();
		assert!(retried.created);
		assert_ne!(retried.order_id, order_id);
	}

	#[tokio::test]
	async fn test_failed_rollback_flags_order() {
		let (service, storage, _faults) = faulty_service(true, true);

		let err = service.submit(jane(), &jane_cart()).await.unwrap_err();
		let SubmissionError::OrderCreationPartialFailure {
			order_id,
			rolled_back,
			..
		} = err
		else {
			panic!("expected partial failure, got {:?}", err);
		};
		assert!(!rolled_back);

		let order: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &order_id)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Cancelled);
		assert_eq!(
			order.decision_note.as_deref(),
			Some(INCOMPLETE_SUBMISSION_NOTE)
		);
	}

	#[tokio::test]
	async fn test_token_of_flagged_order_can_be_reused() {
		let (service, storage, faults) = faulty_service(true, true);
		let request = SubmitOrder {
			submission_token: Some("tok-3".into()),
			..jane()
		};

		let err = service.submit(request.clone(), &jane_cart()).await.unwrap_err();
		assert!(matches!(
			err,
			SubmissionError::OrderCreationPartialFailure {
				rolled_back: false,
				..
			}
		));

		faults.items.store(false, Ordering::SeqCst);
		faults.removals.store(false, Ordering::SeqCst);
		for _ in 0..2 {
			let receipt = service.submit(request.clone(), &jane_cart()).await.unwrap();
			let order: Order = storage
				.retrieve(StorageKey::Orders.as_str(), &receipt.order_id)
				.await
				.unwrap();
			assert_eq!(order.status, OrderStatus::PendingApproval);
			assert_eq!(items_of(&storage, &receipt.order_id).await.len(), 2);
		}
	}

	#[tokio::test]
	async fn test_token_pointing_at_missing_order_is_released() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));
		storage
			.store(
				StorageKey::SubmissionTokens.as_str(),
				&claim_key(Some("bob"), "tok-4"),
				&"vanished-order".to_string(),
			)
			.await
			.unwrap();

		let request = SubmitOrder {
			submission_token: Some("tok-4".into()),
			submitted_by: Some("bob".into()),
			..jane()
		};
		let receipt = service.submit(request.clone(), &jane_cart()).await.unwrap();
		assert!(receipt.created);

		let replayed = service.submit(request, &jane_cart()).await.unwrap();
		assert!(!replayed.created);
		assert_eq!(replayed.order_id, receipt.order_id);
	}

	#[tokio::test]
	async fn test_same_token_from_two_users_creates_two_orders() {
		let (service, storage) = service_over(Box::new(MemoryStorage::new()));
		let from = |user: &str| SubmitOrder {
			submission_token: Some("shared-key".into()),
			submitted_by: Some(user.into()),
			..jane()
		};

		let alice = service.submit(from("alice"), &jane_cart()).await.unwrap();
		let bob = service.submit(from("bob"), &jane_cart()).await.unwrap();
		assert!(alice.created);
		assert!(bob.created);
		assert_ne!(alice.order_id, bob.order_id);

		let bob_again = service.submit(from("bob"), &jane_cart()).await.unwrap();
		assert!(!bob_again.created);
		assert_eq!(bob_again.order_id, bob.order_id);

		let orders: Vec<Order> = storage.list(StorageKey::Orders.as_str()).await.unwrap();
		assert_eq!(orders.len(), 2);
	}

	#[tokio::test]
	async fn test_submitted_event_published() {
		let (service, _storage) = service_over(Box::new(MemoryStorage::new()));
		let mut events = service.event_bus.subscribe();

		let receipt = service.submit(jane(), &jane_cart()).await.unwrap();
		match events.recv().await.unwrap() {
			InventoryEvent::Order(OrderEvent::Submitted {
				order_id,
				item_count,
				..
			}) => {
				assert_eq!(order_id, receipt.order_id);
				assert_eq!(item_count, 2);
			},
			other => panic!("unexpected event: {:?}", other),
		}
	}
}
