//! State management for orders.
//!
//! This module provides the approval state machine that owns every order
//! status change after submission.

pub mod order;

pub use order::{is_valid_transition, ApprovalStateMachine, OrderStateError};
