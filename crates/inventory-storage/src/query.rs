//! Field filters for listing queries.

use serde_json::Value;
use std::cmp::Ordering;

/// A predicate on one top-level field of a stored JSON record.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
	/// `field = value`
	Eq(String, Value),
	/// `field > value`; numbers compare numerically, strings lexically.
	Gt(String, Value),
}

impl QueryFilter {
	pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
		QueryFilter::Eq(field.into(), value.into())
	}

	pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
		QueryFilter::Gt(field.into(), value.into())
	}

	/// Whether the record satisfies this filter. Missing fields never match.
	pub fn matches(&self, record: &Value) -> bool {
		match self {
			QueryFilter::Eq(field, expected) => record.get(field) == Some(expected),
			QueryFilter::Gt(field, bound) => record
				.get(field)
				.and_then(|actual| compare(actual, bound))
				.is_some_and(|ord| ord == Ordering::Greater),
		}
	}
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
			(Some(x), Some(y)) => Some(x.cmp(&y)),
			_ => x.as_f64()?.partial_cmp(&y.as_f64()?),
		},
		(Value::String(x), Value::String(y)) => Some(x.cmp(y)),
		_ => None,
	}
}
