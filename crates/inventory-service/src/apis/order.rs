//! Order endpoints.
//!
//! Submissions assemble a cart from the requested lines against live catalog
//! state and hand it to the submission service. Decisions are forwarded to the
//! approval state machine, which performs the administrator check.

use super::ToApiError;
use inventory_core::{InventoryEngine, SubmitOrder};
use inventory_types::{
	truncate_id, APIError, Order, OrderListQuery, OrderStatus, OrderSummary, OrderWithItems,
	SubmitOrderRequest, SubmitOrderResponse,
};
use std::str::FromStr;
use tracing::{info, warn};

/// Decision an administrator can take on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
	Approve,
	Reject,
	Cancel,
	Ship,
	Complete,
}

impl FromStr for DecisionAction {
	type Err = APIError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"approve" => Ok(Self::Approve),
			"reject" => Ok(Self::Reject),
			"cancel" => Ok(Self::Cancel),
			"ship" => Ok(Self::Ship),
			"complete" => Ok(Self::Complete),
			other => Err(APIError::NotFound {
				error_type: "UNKNOWN_ACTION".to_string(),
				message: format!("Unknown order action: {}", other),
			}),
		}
	}
}

/// Outcome of a submission; `created` is false for a replayed idempotency key.
#[derive(Debug)]
pub struct Submitted {
	pub created: bool,
	pub response: SubmitOrderResponse,
}

/// Handles order submission for an authenticated user.
pub async fn submit_order(
	engine: &InventoryEngine,
	user: &str,
	idempotency_key: Option<String>,
	request: SubmitOrderRequest,
) -> Result<Submitted, APIError> {
	let cart = engine
		.assemble_cart(&request.lines)
		.await
		.map_err(ToApiError::into_api_error)?;

	let receipt = engine
		.submission()
		.submit(
			SubmitOrder {
				customer_name: request.customer_name,
				customer_email: request.customer_email,
				submission_token: idempotency_key,
				submitted_by: Some(user.to_string()),
			},
			&cart,
		)
		.await
		.map_err(|e| {
			warn!(user = %user, error = %e, "Order submission failed");
			e.into_api_error()
		})?;

	// A replay reports the order as it is now
	let status = if receipt.created {
		OrderStatus::PendingApproval
	} else {
		engine
			.state_machine()
			.get_order(&receipt.order_id)
			.await
			.map_err(ToApiError::into_api_error)?
			.status
	};

	Ok(Submitted {
		created: receipt.created,
		response: SubmitOrderResponse {
			order_id: receipt.order_id,
			status,
			total_amount: receipt.total_amount,
		},
	})
}

pub async fn list_orders(
	engine: &InventoryEngine,
	query: OrderListQuery,
) -> Result<Vec<OrderWithItems>, APIError> {
	engine
		.queries()
		.list_orders(query.status)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn get_order(engine: &InventoryEngine, order_id: &str) -> Result<OrderWithItems, APIError> {
	info!("Retrieving order with ID: {}", truncate_id(order_id));
	engine
		.queries()
		.get_order_with_items(order_id)
		.await
		.map_err(ToApiError::into_api_error)
}

pub async fn order_summary(engine: &InventoryEngine) -> Result<OrderSummary, APIError> {
	engine
		.queries()
		.summary()
		.await
		.map_err(ToApiError::into_api_error)
}

/// Applies an administrator decision to an order.
pub async fn decide(
	engine: &InventoryEngine,
	order_id: &str,
	action: DecisionAction,
	user: &str,
	reason: Option<String>,
) -> Result<Order, APIError> {
	let machine = engine.state_machine();
	let result = match action {
		DecisionAction::Approve => machine.approve(order_id, user).await,
		DecisionAction::Reject => machine.reject(order_id, user, reason).await,
		DecisionAction::Cancel => machine.cancel(order_id, user, reason).await,
		DecisionAction::Ship => machine.mark_shipping(order_id, user).await,
		DecisionAction::Complete => machine.mark_completed(order_id, user).await,
	};
	result.map_err(|e| {
		warn!(
			order_id = %truncate_id(order_id),
			action = ?action,
			error = %e,
			"Order decision failed"
		);
		e.into_api_error()
	})
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use inventory_config::builders::config::ConfigBuilder;
	use inventory_core::{InventoryBuilder, InventoryFactories};
	use inventory_types::{OrderLineRequest, StockProduct};
	use rust_decimal::Decimal;

	/// Engine over memory storage; alice is an administrator, bob is not.
	pub(crate) fn test_engine() -> InventoryEngine {
		let identity: toml::Value = toml::from_str(
			r#"
admins = ["alice"]
[tokens]
"token-alice" = "alice"
"token-bob" = "bob"
"#,
		)
		.unwrap();
		let config = ConfigBuilder::new().identity("static", identity).build();
		let factories = InventoryFactories {
			storage_factories: inventory_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			identity_factories: inventory_identity::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		InventoryBuilder::new(config).build(factories).unwrap()
	}

	pub(crate) fn product(id: &str, stock: u32) -> StockProduct {
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

	fn request(item_id: &str, quantity: u32) -> SubmitOrderRequest {
		SubmitOrderRequest {
			customer_name: "Jane".into(),
			customer_email: Some("jane@example.com".into()),
			lines: vec![OrderLineRequest {
				item_id: item_id.into(),
				quantity,
			}],
		}
	}

	#[tokio::test]
	async fn test_submit_and_approve() {
		let engine = test_engine();
		engine.register_product("alice", product("A", 3)).await.unwrap();

		let submitted = submit_order(&engine, "bob", None, request("A", 2))
			.await
			.unwrap();
		assert!(submitted.created);
		assert_eq!(submitted.response.status, OrderStatus::PendingApproval);
		assert_eq!(submitted.response.total_amount, Decimal::new(300, 0));

		let order_id = submitted.response.order_id;
		let err = decide(&engine, &order_id, DecisionAction::Approve, "bob", None)
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 403);

		let order = decide(&engine, &order_id, DecisionAction::Approve, "alice", None)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Approved);

		let detail = get_order(&engine, &order_id).await.unwrap();
		assert_eq!(detail.items.len(), 1);
		assert_eq!(detail.order.submitted_by.as_deref(), Some("bob"));
	}

	#[tokio::test]
	async fn test_idempotency_key_replays_order() {
		let engine = test_engine();
		engine.register_product("alice", product("A", 3)).await.unwrap();

		let first = submit_order(&engine, "bob", Some("key-1".into()), request("A", 1))
			.await
			.unwrap();
		let second = submit_order(&engine, "bob", Some("key-1".into()), request("A", 1))
			.await
			.unwrap();
		assert!(!second.created);
		assert_eq!(first.response.order_id, second.response.order_id);

		let orders = list_orders(&engine, OrderListQuery::default()).await.unwrap();
		assert_eq!(orders.len(), 1);
	}

	#[tokio::test]
	async fn test_oversized_line_is_a_conflict() {
		let engine = test_engine();
		engine.register_product("alice", product("A", 2)).await.unwrap();

		let err = submit_order(&engine, "bob", None, request("A", 3))
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 409);
		assert_eq!(err.to_error_response().error, "INSUFFICIENT_STOCK");

		let summary = order_summary(&engine).await.unwrap();
		assert_eq!(summary.total, 0);
	}

	#[tokio::test]
	async fn test_decision_on_terminal_order() {
		let engine = test_engine();
		engine.register_product("alice", product("A", 2)).await.unwrap();
		let submitted = submit_order(&engine, "bob", None, request("A", 1))
			.await
			.unwrap();
		let order_id = submitted.response.order_id;

		decide(
			&engine,
			&order_id,
			DecisionAction::Reject,
			"alice",
			Some("no budget".into()),
		)
		.await
		.unwrap();
		let err = decide(&engine, &order_id, DecisionAction::Approve, "alice", None)
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 409);
	}

	#[test]
	fn test_action_parsing() {
		assert_eq!("ship".parse::<DecisionAction>().unwrap(), DecisionAction::Ship);
		let err = "refund".parse::<DecisionAction>().unwrap_err();
		assert_eq!(err.status_code(), 404);
	}
}
