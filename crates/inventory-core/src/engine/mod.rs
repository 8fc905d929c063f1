//! Inventory engine tying the catalog, submission, approval and query
//! services together.
//!
//! The engine owns one instance of each service, shared through `Arc`, and a
//! background loop that cleans up expired storage entries and records
//! workflow events until shutdown.

pub mod event_bus;

use crate::cart::{Cart, CartError};
use crate::query::OrderQueryService;
use crate::state::ApprovalStateMachine;
use crate::submission::OrderSubmissionService;
use inventory_catalog::{CatalogError, CatalogService};
use inventory_config::Config;
use inventory_identity::IdentityService;
use inventory_storage::StorageService;
use inventory_types::{
	CatalogEvent, EquipmentStatus, InventoryEvent, OrderLineRequest, StockProduct,
	UniqueEquipment,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("User {0} is not allowed to manage the catalog")]
	PermissionDenied(String),
	#[error("Identity error: {0}")]
	Identity(String),
	#[error(transparent)]
	Cart(#[from] CartError),
	#[error(transparent)]
	Catalog(#[from] CatalogError),
}

/// Main inventory engine.
#[derive(Clone)]
pub struct InventoryEngine {
	config: Config,
	storage: Arc<StorageService>,
	identity: Arc<IdentityService>,
	catalog: Arc<CatalogService>,
	submission: Arc<OrderSubmissionService>,
	state_machine: Arc<ApprovalStateMachine>,
	queries: Arc<OrderQueryService>,
	event_bus: event_bus::EventBus,
}

impl InventoryEngine {
	/// Creates a new engine, wiring every service to the shared storage.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		identity: Arc<IdentityService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let catalog = Arc::new(CatalogService::new(storage.clone()));

		let token_ttl = Duration::from_secs(config.orders.submission_token_ttl_seconds);
		let submission = Arc::new(
			OrderSubmissionService::new(storage.clone(), event_bus.clone())
				.with_token_ttl(Some(token_ttl)),
		);

		let state_machine = Arc::new(ApprovalStateMachine::new(
			storage.clone(),
			identity.clone(),
			event_bus.clone(),
			config.orders.approval_max_retries,
		));

		let queries = Arc::new(OrderQueryService::new(storage.clone()));

		Self {
			config,
			storage,
			identity,
			catalog,
			submission,
			state_machine,
			queries,
			event_bus,
		}
	}

	/// Runs background maintenance until Ctrl-C is received.
	pub async fn run(&self) -> Result<(), EngineError> {
		if self.config.storage.cleanup_interval_seconds == 0 {
			return Err(EngineError::Config(
				"storage.cleanup_interval_seconds must be greater than zero".into(),
			));
		}

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		let mut events = self.event_bus.subscribe();
		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(event) => record_event(&event),
					Err(RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "Event log fell behind");
					},
					Err(RecvError::Closed) => break,
				},
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		cleanup_handle.abort();
		tracing::info!(service = %self.config.service.id, "Inventory engine stopped");
		Ok(())
	}

	/// Builds a cart from requested lines against live catalog state.
	///
	/// Fails on the first line that cannot be added, e.g. an unknown item or
	/// more units than are in stock.
	pub async fn assemble_cart(&self, lines: &[OrderLineRequest]) -> Result<Cart, EngineError> {
		let mut cart = Cart::new();
		for line in lines {
			let item = self.catalog.get_item(&line.item_id).await?;
			cart.add_item(&item, line.quantity)?;
		}
		Ok(cart)
	}

	/// Adds a stock product to the catalog.
	pub async fn register_product(
		&self,
		acting_user: &str,
		product: StockProduct,
	) -> Result<StockProduct, EngineError> {
		self.ensure_admin(acting_user).await?;
		Ok(self.catalog.register_product(product).await?)
	}

	/// Adds a piece of equipment to the catalog.
	pub async fn register_equipment(
		&self,
		acting_user: &str,
		equipment: UniqueEquipment,
	) -> Result<UniqueEquipment, EngineError> {
		self.ensure_admin(acting_user).await?;
		Ok(self.catalog.register_equipment(equipment).await?)
	}

	/// Restocks or corrects a product's quantity.
	pub async fn set_product_stock(
		&self,
		acting_user: &str,
		item_id: &str,
		quantity: u32,
	) -> Result<(), EngineError> {
		self.ensure_admin(acting_user).await?;
		let previous = self.catalog.set_product_stock(item_id, quantity).await?;
		self.event_bus
			.publish(InventoryEvent::Catalog(CatalogEvent::StockChanged {
				item_id: item_id.to_string(),
				previous,
				current: quantity,
			}))
			.ok();
		Ok(())
	}

	/// Moves equipment to a new lifecycle status.
	pub async fn set_equipment_status(
		&self,
		acting_user: &str,
		item_id: &str,
		status: EquipmentStatus,
	) -> Result<(), EngineError> {
		self.ensure_admin(acting_user).await?;
		let previous = self.catalog.set_equipment_status(item_id, status).await?;
		self.event_bus
			.publish(InventoryEvent::Catalog(CatalogEvent::EquipmentStatusChanged {
				item_id: item_id.to_string(),
				previous,
				current: status,
			}))
			.ok();
		Ok(())
	}

	async fn ensure_admin(&self, acting_user: &str) -> Result<(), EngineError> {
		let is_admin = self
			.identity
			.is_admin(acting_user)
			.await
			.map_err(|e| EngineError::Identity(e.to_string()))?;
		if is_admin {
			Ok(())
		} else {
			Err(EngineError::PermissionDenied(acting_user.to_string()))
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn identity(&self) -> &Arc<IdentityService> {
		&self.identity
	}

	pub fn catalog(&self) -> &Arc<CatalogService> {
		&self.catalog
	}

	pub fn submission(&self) -> &Arc<OrderSubmissionService> {
		&self.submission
	}

	pub fn state_machine(&self) -> &Arc<ApprovalStateMachine> {
		&self.state_machine
	}

	pub fn queries(&self) -> &Arc<OrderQueryService> {
		&self.queries
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}
}

fn record_event(event: &InventoryEvent) {
	match event {
		InventoryEvent::Order(order_event) => {
			tracing::info!(target: "inventory::audit", event = ?order_event, "Order event");
		},
		InventoryEvent::Catalog(catalog_event) => {
			tracing::debug!(target: "inventory::audit", event = ?catalog_event, "Catalog event");
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::submission::SubmitOrder;
	use inventory_config::builders::config::ConfigBuilder;
	use inventory_identity::MockIdentityInterface;
	use inventory_storage::implementations::memory::MemoryStorage;
	use inventory_types::{OrderStatus, StorageKey};
	use rust_decimal::Decimal;

	fn engine() -> InventoryEngine {
		let mut backend = MockIdentityInterface::new();
		backend
			.expect_is_admin()
			.returning(|user| Ok(user == "admin"));
		InventoryEngine::new(
			ConfigBuilder::new().build(),
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(IdentityService::new(Box::new(backend))),
			event_bus::EventBus::new(64),
		)
	}

	fn product(id: &str, stock: u32) -> StockProduct {
		StockProduct {
			id: id.into(),
			name: format!("Product {}", id),
			sku: format!("SKU-{}", id),
			category_id: "network".into(),
			description: None,
			unit_price: Decimal::new(150, 0),
			cost: None,
			supplier: None,
			quantity_available: stock,
			updated_at: 0,
		}
	}

	fn line(item_id: &str, quantity: u32) -> OrderLineRequest {
		OrderLineRequest {
			item_id: item_id.into(),
			quantity,
		}
	}

	#[tokio::test]
	async fn test_assemble_cart_checks_live_stock() {
		let engine = engine();
		engine.register_product("admin", product("A", 2)).await.unwrap();

		let cart = engine.assemble_cart(&[line("A", 2)]).await.unwrap();
		assert_eq!(cart.total(), Decimal::new(300, 0));

		let err = engine.assemble_cart(&[line("A", 3)]).await.unwrap_err();
		assert!(matches!(err, EngineError::Cart(CartError::InsufficientStock { .. })));

		let err = engine.assemble_cart(&[line("missing", 1)]).await.unwrap_err();
		assert!(matches!(err, EngineError::Catalog(CatalogError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_catalog_changes_require_admin() {
		let engine = engine();
		let err = engine
			.register_product("bob", product("A", 2))
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::PermissionDenied(u) if u == "bob"));
		assert!(!engine
			.storage()
			.exists(StorageKey::Products.as_str(), "A")
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_stock_change_is_published() {
		let engine = engine();
		engine.register_product("admin", product("A", 2)).await.unwrap();
		let mut events = engine.event_bus().subscribe();

		engine.set_product_stock("admin", "A", 10).await.unwrap();
		assert!(matches!(
			events.recv().await.unwrap(),
			InventoryEvent::Catalog(CatalogEvent::StockChanged {
				previous: 2,
				current: 10,
				..
			})
		));
	}

	#[tokio::test]
	async fn test_submit_then_approve_round_trip() {
		let engine = engine();
		engine.register_product("admin", product("A", 3)).await.unwrap();

		let cart = engine.assemble_cart(&[line("A", 2)]).await.unwrap();
		let receipt = engine
			.submission()
			.submit(
				SubmitOrder {
					customer_name: "Jane".into(),
					..Default::default()
				},
				&cart,
			)
			.await
			.unwrap();

		let order = engine
			.state_machine()
			.approve(&receipt.order_id, "admin")
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Approved);

		let remaining = engine.catalog().get_item("A").await.unwrap();
		assert_eq!(remaining.available_quantity(), 1);

		let summary = engine.queries().summary().await.unwrap();
		assert_eq!(summary.items_sold, 2);
		assert_eq!(summary.approved_value, Decimal::new(300, 0));
	}
}
