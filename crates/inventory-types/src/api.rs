//! API types for the HTTP surface.
//!
//! Request and response bodies for the catalog and order endpoints, plus the
//! structured error type every handler returns.

use crate::{CatalogItemKind, EquipmentStatus, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One requested line in an order submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderLineRequest {
	/// Catalog item identifier.
	pub item_id: String,
	/// Requested units, defaults to 1.
	#[serde(default = "default_line_quantity")]
	pub quantity: u32,
}

fn default_line_quantity() -> u32 {
	1
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitOrderRequest {
	pub customer_name: String,
	#[serde(default)]
	pub customer_email: Option<String>,
	pub lines: Vec<OrderLineRequest>,
}

/// Response of a successful submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitOrderResponse {
	pub order_id: String,
	pub status: OrderStatus,
	pub total_amount: Decimal,
}

/// Optional body of decision endpoints (reject, cancel).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DecisionRequest {
	#[serde(default)]
	pub reason: Option<String>,
}

/// Body of `PUT /api/catalog/products/{id}/stock`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StockUpdateRequest {
	pub quantity: u32,
}

/// Body of `PUT /api/catalog/equipment/{id}/status`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EquipmentStatusRequest {
	pub status: EquipmentStatus,
}

/// Query string of `GET /api/catalog`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogQuery {
	pub category: Option<String>,
	pub search: Option<String>,
	pub kind: Option<CatalogItemKind>,
}

/// Query string of `GET /api/orders`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrderListQuery {
	pub status: Option<OrderStatus>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed or invalid input (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Missing or unknown credentials (401)
	Unauthorized { message: String },
	/// Caller lacks the capability (403)
	Forbidden { error_type: String, message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with current state (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Backing store unavailable, retry later (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Anything else (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::Conflict {
				error_type,
				message,
				details,
			} => (error_type.clone(), message.clone(), details.clone(), None),
			APIError::Unauthorized { message } => {
				("UNAUTHORIZED".to_string(), message.clone(), None, None)
			},
			APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type.clone(), message.clone(), None, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type.clone(), message.clone(), None, *retry_after),
		};
		ErrorResponse {
			error,
			message,
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_line_quantity_defaults_to_one() {
		let line: OrderLineRequest = serde_json::from_str(r#"{"item_id":"p-1"}"#).unwrap();
		assert_eq!(line.quantity, 1);
	}

	#[test]
	fn test_service_unavailable_carries_retry_after() {
		let err = APIError::ServiceUnavailable {
			error_type: "STORAGE_UNAVAILABLE".into(),
			message: "try again".into(),
			retry_after: Some(5),
		};
		assert_eq!(err.status_code(), 503);
		let body = serde_json::to_value(err.to_error_response()).unwrap();
		assert_eq!(body["retryAfter"], 5);
		assert_eq!(body["error"], "STORAGE_UNAVAILABLE");
	}
}
