//! HTTP API handlers and the mapping from workflow errors to API errors.

pub mod catalog;
pub mod order;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use inventory_catalog::CatalogError;
use inventory_core::{
	CartError, EngineError, InventoryEngine, OrderStateError, QueryError, SubmissionError,
};
use inventory_identity::IdentityError;
use inventory_types::APIError;
use serde_json::json;

/// Seconds clients are asked to wait before retrying after a storage outage.
const RETRY_AFTER_SECONDS: u64 = 5;

/// Resolves the bearer token of a request to a user id.
pub async fn authenticate(engine: &InventoryEngine, headers: &HeaderMap) -> Result<String, APIError> {
	let token = headers
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.ok_or_else(|| APIError::Unauthorized {
			message: "Missing bearer token".to_string(),
		})?;

	engine
		.identity()
		.authenticate(token)
		.await
		.map_err(ToApiError::into_api_error)
}

/// Conversion of a workflow error into the API error returned to clients.
pub trait ToApiError {
	fn into_api_error(self) -> APIError;
}

fn unavailable(message: String) -> APIError {
	APIError::ServiceUnavailable {
		error_type: "STORAGE_UNAVAILABLE".to_string(),
		message,
		retry_after: Some(RETRY_AFTER_SECONDS),
	}
}

impl ToApiError for IdentityError {
	fn into_api_error(self) -> APIError {
		match self {
			IdentityError::InvalidCredentials => APIError::Unauthorized {
				message: self.to_string(),
			},
			IdentityError::Unavailable(_) => APIError::ServiceUnavailable {
				error_type: "IDENTITY_UNAVAILABLE".to_string(),
				message: self.to_string(),
				retry_after: Some(RETRY_AFTER_SECONDS),
			},
			IdentityError::Configuration(_) => APIError::InternalServerError {
				error_type: "IDENTITY_MISCONFIGURED".to_string(),
				message: self.to_string(),
			},
		}
	}
}

impl ToApiError for CartError {
	fn into_api_error(self) -> APIError {
		let message = self.to_string();
		match self {
			CartError::InsufficientStock {
				item_id,
				available,
				remaining,
			} => APIError::Conflict {
				error_type: "INSUFFICIENT_STOCK".to_string(),
				message,
				details: Some(json!({
					"item_id": item_id,
					"available": available,
					"remaining": remaining,
				})),
			},
			CartError::AlreadyInCart(item_id) => APIError::Conflict {
				error_type: "ALREADY_IN_CART".to_string(),
				message,
				details: Some(json!({ "item_id": item_id })),
			},
			CartError::InvalidQuantity { .. } | CartError::NotInCart(_) => APIError::BadRequest {
				error_type: "INVALID_QUANTITY".to_string(),
				message,
				details: None,
			},
		}
	}
}

impl ToApiError for CatalogError {
	fn into_api_error(self) -> APIError {
		let message = self.to_string();
		match self {
			CatalogError::NotFound(_) => APIError::NotFound {
				error_type: "ITEM_NOT_FOUND".to_string(),
				message,
			},
			CatalogError::AlreadyExists(_) => APIError::Conflict {
				error_type: "ITEM_EXISTS".to_string(),
				message,
				details: None,
			},
			CatalogError::Validation(_) => APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message,
				details: None,
			},
			CatalogError::Conflict(_) => APIError::Conflict {
				error_type: "CONCURRENT_MODIFICATION".to_string(),
				message,
				details: None,
			},
			CatalogError::Storage(_) => unavailable(message),
		}
	}
}

impl ToApiError for EngineError {
	fn into_api_error(self) -> APIError {
		match self {
			EngineError::Cart(e) => e.into_api_error(),
			EngineError::Catalog(e) => e.into_api_error(),
			EngineError::PermissionDenied(_) => APIError::Forbidden {
				error_type: "PERMISSION_DENIED".to_string(),
				message: self.to_string(),
			},
			EngineError::Identity(_) => APIError::ServiceUnavailable {
				error_type: "IDENTITY_UNAVAILABLE".to_string(),
				message: self.to_string(),
				retry_after: Some(RETRY_AFTER_SECONDS),
			},
			EngineError::Config(_) => APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: self.to_string(),
			},
		}
	}
}

impl ToApiError for SubmissionError {
	fn into_api_error(self) -> APIError {
		let message = self.to_string();
		match self {
			SubmissionError::Validation(_) => APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message,
				details: None,
			},
			SubmissionError::OrderCreationPartialFailure { .. } => APIError::InternalServerError {
				error_type: "ORDER_CREATION_PARTIAL_FAILURE".to_string(),
				message,
			},
			SubmissionError::Storage(_) => unavailable(message),
		}
	}
}

impl ToApiError for OrderStateError {
	fn into_api_error(self) -> APIError {
		let message = self.to_string();
		match self {
			OrderStateError::PermissionDenied(_) => APIError::Forbidden {
				error_type: "PERMISSION_DENIED".to_string(),
				message,
			},
			OrderStateError::InvalidTransition { from, to } => APIError::Conflict {
				error_type: "INVALID_TRANSITION".to_string(),
				message,
				details: Some(json!({ "from": from, "to": to })),
			},
			OrderStateError::InsufficientStock {
				item_id,
				available,
				requested,
			} => APIError::Conflict {
				error_type: "INSUFFICIENT_STOCK".to_string(),
				message,
				details: Some(json!({
					"item_id": item_id,
					"available": available,
					"requested": requested,
				})),
			},
			OrderStateError::ItemUnavailable(item_id) => APIError::Conflict {
				error_type: "ITEM_UNAVAILABLE".to_string(),
				message,
				details: Some(json!({ "item_id": item_id })),
			},
			OrderStateError::OrderIncomplete(_) => APIError::Conflict {
				error_type: "ORDER_INCOMPLETE".to_string(),
				message,
				details: None,
			},
			OrderStateError::Conflict(_) => APIError::Conflict {
				error_type: "CONCURRENT_MODIFICATION".to_string(),
				message,
				details: None,
			},
			OrderStateError::OrderNotFound(_) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			OrderStateError::Identity(_) => APIError::ServiceUnavailable {
				error_type: "IDENTITY_UNAVAILABLE".to_string(),
				message,
				retry_after: Some(RETRY_AFTER_SECONDS),
			},
			OrderStateError::Storage(_) => unavailable(message),
		}
	}
}

impl ToApiError for QueryError {
	fn into_api_error(self) -> APIError {
		let message = self.to_string();
		match self {
			QueryError::NotFound(_) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			QueryError::Storage(_) => unavailable(message),
		}
	}
}
