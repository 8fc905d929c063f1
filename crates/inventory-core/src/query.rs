//! Read-only views over orders.
//!
//! Orders whose items were never written (a failed submission that could not
//! be rolled back) are hidden from every view.

use inventory_storage::{QueryFilter, StorageError, StorageService};
use inventory_types::{Order, OrderItem, OrderStatus, OrderSummary, OrderWithItems, StorageKey};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for QueryError {
	fn from(err: StorageError) -> Self {
		QueryError::Storage(err.to_string())
	}
}

pub struct OrderQueryService {
	storage: Arc<StorageService>,
}

impl OrderQueryService {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Lists orders newest first, optionally narrowed to one status.
	pub async fn list_orders(
		&self,
		status: Option<OrderStatus>,
	) -> Result<Vec<OrderWithItems>, QueryError> {
		let filters: Vec<QueryFilter> = status
			.map(|s| QueryFilter::eq("status", s.as_str()))
			.into_iter()
			.collect();
		let orders: Vec<Order> = self
			.storage
			.query(StorageKey::Orders.as_str(), &filters)
			.await?;

		let items: Vec<OrderItem> = self.storage.list(StorageKey::OrderItems.as_str()).await?;
		let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
		for item in items {
			by_order.entry(item.order_id.clone()).or_default().push(item);
		}

		let mut listed: Vec<OrderWithItems> = orders
			.into_iter()
			.filter_map(|order| {
				let mut items = by_order.remove(&order.id)?;
				items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
				Some(OrderWithItems { order, items })
			})
			.collect();
		listed.sort_by(|a, b| {
			b.order
				.created_at
				.cmp(&a.order.created_at)
				.then_with(|| a.order.id.cmp(&b.order.id))
		});
		Ok(listed)
	}

	/// Loads one order with its items.
	pub async fn get_order_with_items(&self, order_id: &str) -> Result<OrderWithItems, QueryError> {
		let order: Order = match self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
		{
			Ok(order) => order,
			Err(StorageError::NotFound) => return Err(QueryError::NotFound(order_id.to_string())),
			Err(e) => return Err(e.into()),
		};

		let mut items: Vec<OrderItem> = self
			.storage
			.query(
				StorageKey::OrderItems.as_str(),
				&[QueryFilter::eq("order_id", order_id)],
			)
			.await?;
		if items.is_empty() {
			return Err(QueryError::NotFound(order_id.to_string()));
		}
		items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

		Ok(OrderWithItems { order, items })
	}

	/// Aggregate figures over all listed orders.
	pub async fn summary(&self) -> Result<OrderSummary, QueryError> {
		let orders = self.list_orders(None).await?;

		let mut summary = OrderSummary {
			total: orders.len(),
			..Default::default()
		};
		for entry in &orders {
			if entry.order.status == OrderStatus::PendingApproval {
				summary.pending += 1;
			}
			if entry.order.status.has_committed_stock() {
				summary.items_sold += entry.unit_count();
				summary.approved_value += entry.order.total_amount;
			}
		}
		Ok(summary)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use inventory_storage::implementations::memory::MemoryStorage;
	use inventory_types::CatalogItemKind;
	use rust_decimal::Decimal;

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	async fn seed(
		storage: &StorageService,
		id: &str,
		status: OrderStatus,
		created_at: u64,
		quantities: &[u32],
	) {
		let total: u32 = quantities.iter().sum();
		let order = Order {
			id: id.into(),
			customer_name: "Jane".into(),
			customer_email: None,
			status,
			total_amount: Decimal::from(total * 10),
			created_at,
			updated_at: created_at,
			approved_by: None,
			approved_at: None,
			submitted_by: None,
			submission_token: None,
			decision_note: None,
		};
		storage
			.store(StorageKey::Orders.as_str(), id, &order)
			.await
			.unwrap();
		for (n, quantity) in quantities.iter().enumerate() {
			let item = OrderItem {
				id: format!("{}-{}", id, n),
				order_id: id.into(),
				catalog_item_id: format!("p-{}", n),
				item_kind: CatalogItemKind::Product,
				name: "Cabo".into(),
				code: "CAB".into(),
				quantity: *quantity,
				unit_price: Decimal::from(10),
				created_at,
			};
			storage
				.store(StorageKey::OrderItems.as_str(), &item.id, &item)
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn test_list_newest_first_without_incomplete() {
		let storage = storage();
		seed(&storage, "old", OrderStatus::Approved, 100, &[1]).await;
		seed(&storage, "new", OrderStatus::PendingApproval, 300, &[2, 1]).await;
		seed(&storage, "broken", OrderStatus::PendingApproval, 200, &[]).await;

		let service = OrderQueryService::new(storage);
		let orders = service.list_orders(None).await.unwrap();
		let ids: Vec<&str> = orders.iter().map(|o| o.order.id.as_str()).collect();
		assert_eq!(ids, vec!["new", "old"]);
		assert_eq!(orders[0].items.len(), 2);

		let pending = service
			.list_orders(Some(OrderStatus::PendingApproval))
			.await
			.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].order.id, "new");
	}

	#[tokio::test]
	async fn test_get_order_with_items() {
		let storage = storage();
		seed(&storage, "o-1", OrderStatus::PendingApproval, 1, &[2, 3]).await;
		seed(&storage, "broken", OrderStatus::PendingApproval, 1, &[]).await;

		let service = OrderQueryService::new(storage);
		let detail = service.get_order_with_items("o-1").await.unwrap();
		assert_eq!(detail.unit_count(), 5);

		assert!(matches!(
			service.get_order_with_items("missing").await,
			Err(QueryError::NotFound(_))
		));
		assert!(matches!(
			service.get_order_with_items("broken").await,
			Err(QueryError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_summary_counts_committed_orders() {
		let storage = storage();
		seed(&storage, "a", OrderStatus::PendingApproval, 1, &[1]).await;
		seed(&storage, "b", OrderStatus::Approved, 2, &[2, 1]).await;
		seed(&storage, "c", OrderStatus::Completed, 3, &[4]).await;
		seed(&storage, "d", OrderStatus::Rejected, 4, &[5]).await;

		let summary = OrderQueryService::new(storage).summary().await.unwrap();
		assert_eq!(summary.total, 4);
		assert_eq!(summary.pending, 1);
		assert_eq!(summary.items_sold, 7);
		assert_eq!(summary.approved_value, Decimal::from(70));
	}
}
