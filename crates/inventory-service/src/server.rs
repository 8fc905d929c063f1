//! HTTP server for the inventory API.
//!
//! Every route lives under `/api`. Handlers here only extract request parts
//! and delegate to the `apis` modules.

use crate::apis::{self, order::DecisionAction};
use axum::{
	body::Bytes,
	extract::{DefaultBodyLimit, Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post, put},
	Router,
};
use inventory_config::ApiConfig;
use inventory_core::InventoryEngine;
use inventory_types::{
	APIError, CatalogQuery, DecisionRequest, EquipmentStatusRequest, OrderListQuery,
	StockProduct, StockUpdateRequest, SubmitOrderRequest, UniqueEquipment,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Header carrying the client's submission token.
const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine for processing requests.
	pub engine: Arc<InventoryEngine>,
}

/// Builds the API router.
pub fn router(engine: Arc<InventoryEngine>, max_request_size: usize) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/catalog", get(handle_list_catalog))
				.route("/catalog/categories", get(handle_list_categories))
				.route("/catalog/summary", get(handle_inventory_summary))
				.route("/catalog/products", post(handle_register_product))
				.route("/catalog/equipment", post(handle_register_equipment))
				.route("/catalog/products/{id}/stock", put(handle_set_stock))
				.route("/catalog/equipment/{id}/status", put(handle_set_status))
				.route("/orders", post(handle_submit_order).get(handle_list_orders))
				.route("/orders/summary", get(handle_order_summary))
				.route("/orders/{id}", get(handle_get_order))
				.route("/orders/{id}/{action}", post(handle_decision)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<InventoryEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine, api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Inventory API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET /api/catalog requests.
async fn handle_list_catalog(
	State(state): State<AppState>,
	Query(query): Query<CatalogQuery>,
) -> Result<Response, APIError> {
	let items = apis::catalog::list_catalog(&state.engine, query).await?;
	Ok(Json(items).into_response())
}

/// Handles GET /api/catalog/categories requests.
async fn handle_list_categories(State(state): State<AppState>) -> Response {
	Json(apis::catalog::list_categories(&state.engine)).into_response()
}

/// Handles GET /api/catalog/summary requests.
async fn handle_inventory_summary(State(state): State<AppState>) -> Result<Response, APIError> {
	let summary = apis::catalog::inventory_summary(&state.engine).await?;
	Ok(Json(summary).into_response())
}

/// Handles POST /api/catalog/products requests.
async fn handle_register_product(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(product): Json<StockProduct>,
) -> Result<Response, APIError> {
	let user = apis::authenticate(&state.engine, &headers).await?;
	let product = apis::catalog::register_product(&state.engine, &user, product).await?;
	Ok((StatusCode::CREATED, Json(product)).into_response())
}

/// Handles POST /api/catalog/equipment requests.
async fn handle_register_equipment(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(equipment): Json<UniqueEquipment>,
) -> Result<Response, APIError> {
	let user = apis::authenticate(&state.engine, &headers).await?;
	let equipment = apis::catalog::register_equipment(&state.engine, &user, equipment).await?;
	Ok((StatusCode::CREATED, Json(equipment)).into_response())
}

/// Handles PUT /api/catalog/products/{id}/stock requests.
async fn handle_set_stock(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<StockUpdateRequest>,
) -> Result<Response, APIError> {
	let user = apis::authenticate(&state.engine, &headers).await?;
	let item = apis::catalog::set_product_stock(&state.engine, &user, &id, request.quantity).await?;
	Ok(Json(item).into_response())
}

/// Handles PUT /api/catalog/equipment/{id}/status requests.
async fn handle_set_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<EquipmentStatusRequest>,
) -> Result<Response, APIError> {
	let user = apis::authenticate(&state.engine, &headers).await?;
	let item =
		apis::catalog::set_equipment_status(&state.engine, &user, &id, request.status).await?;
	Ok(Json(item).into_response())
}

/// Handles POST /api/orders requests.
///
/// Answers 201 for a new order and 200 when the idempotency key was already
/// used.
async fn handle_submit_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<SubmitOrderRequest>,
) -> Result<Response, APIError> {
	let user = apis::authenticate(&state.engine, &headers).await?;
	let idempotency_key = headers
		.get(IDEMPOTENCY_KEY)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);

	let submitted = apis::order::submit_order(&state.engine, &user, idempotency_key, request).await?;
	let status = if submitted.created {
		StatusCode::CREATED
	} else {
		StatusCode::OK
	};
	Ok((status, Json(submitted.response)).into_response())
}

/// Handles GET /api/orders requests.
async fn handle_list_orders(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<OrderListQuery>,
) -> Result<Response, APIError> {
	apis::authenticate(&state.engine, &headers).await?;
	let orders = apis::order::list_orders(&state.engine, query).await?;
	Ok(Json(orders).into_response())
}

/// Handles GET /api/orders/summary requests.
async fn handle_order_summary(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Response, APIError> {
	apis::authenticate(&state.engine, &headers).await?;
	let summary = apis::order::order_summary(&state.engine).await?;
	Ok(Json(summary).into_response())
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Response, APIError> {
	apis::authenticate(&state.engine, &headers).await?;
	let order = apis::order::get_order(&state.engine, &id).await?;
	Ok(Json(order).into_response())
}

/// Handles POST /api/orders/{id}/{action} requests.
///
/// The body is optional and only read for a rejection or cancellation reason.
async fn handle_decision(
	State(state): State<AppState>,
	Path((id, action)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, APIError> {
	let action: DecisionAction = action.parse()?;
	let user = apis::authenticate(&state.engine, &headers).await?;

	let decision = if body.is_empty() {
		DecisionRequest::default()
	} else {
		serde_json::from_slice::<DecisionRequest>(&body).map_err(|e| APIError::BadRequest {
			error_type: "INVALID_BODY".to_string(),
			message: e.to_string(),
			details: None,
		})?
	};

	let order = apis::order::decide(&state.engine, &id, action, &user, decision.reason).await?;
	Ok(Json(order).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::apis::order::tests::{product, test_engine};
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use tower::ServiceExt;

	fn app() -> (Router, Arc<InventoryEngine>) {
		let engine = Arc::new(test_engine());
		(router(engine.clone(), 1024 * 1024), engine)
	}

	async fn body_json(response: Response) -> serde_json::Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	fn submit(token: Option<&str>, idempotency_key: Option<&str>) -> Request<Body> {
		let mut builder = Request::post("/api/orders").header("content-type", "application/json");
		if let Some(token) = token {
			builder = builder.header("authorization", format!("Bearer {}", token));
		}
		if let Some(key) = idempotency_key {
			builder = builder.header(IDEMPOTENCY_KEY, key);
		}
		builder
			.body(Body::from(
				r#"{"customer_name":"Jane","lines":[{"item_id":"A","quantity":2}]}"#,
			))
			.unwrap()
	}

	#[tokio::test]
	async fn test_catalog_is_public() {
		let (app, engine) = app();
		engine.register_product("alice", product("A", 3)).await.unwrap();

		let response = app
			.oneshot(Request::get("/api/catalog").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let items = body_json(response).await;
		assert_eq!(items[0]["id"], "A");
		assert_eq!(items[0]["kind"], "product");
	}

	#[tokio::test]
	async fn test_orders_require_token() {
		let (app, _engine) = app();
		let response = app.clone().oneshot(submit(None, None)).await.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

		let response = app.oneshot(submit(Some("stolen"), None)).await.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
		let body = body_json(response).await;
		assert_eq!(body["error"], "UNAUTHORIZED");
	}

	#[tokio::test]
	async fn test_submission_and_replay_status_codes() {
		let (app, engine) = app();
		engine.register_product("alice", product("A", 3)).await.unwrap();

		let response = app
			.clone()
			.oneshot(submit(Some("token-bob"), Some("k-1")))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);
		let created = body_json(response).await;
		assert_eq!(created["status"], "pending_approval");

		let response = app
			.oneshot(submit(Some("token-bob"), Some("k-1")))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let replayed = body_json(response).await;
		assert_eq!(replayed["order_id"], created["order_id"]);
	}

	#[tokio::test]
	async fn test_reject_with_reason() {
		let (app, engine) = app();
		engine.register_product("alice", product("A", 3)).await.unwrap();

		let response = app
			.clone()
			.oneshot(submit(Some("token-bob"), None))
			.await
			.unwrap();
		let created = body_json(response).await;
		let order_id = created["order_id"].as_str().unwrap().to_string();

		let response = app
			.clone()
			.oneshot(
				Request::post(format!("/api/orders/{}/reject", order_id))
					.header("authorization", "Bearer token-alice")
					.body(Body::from(r#"{"reason":"over budget"}"#))
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let order = body_json(response).await;
		assert_eq!(order["status"], "rejected");
		assert_eq!(order["decision_note"], "over budget");

		let response = app
			.oneshot(
				Request::post(format!("/api/orders/{}/approve", order_id))
					.header("authorization", "Bearer token-alice")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CONFLICT);
	}
}
