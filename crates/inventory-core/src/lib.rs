//! Core workflow for the inventory order system.
//!
//! This crate holds the shopping cart, the order submission service, the
//! approval state machine and the read-side order queries, plus the engine
//! and builder that wire them to the configured storage and identity
//! backends.

pub mod builder;
pub mod cart;
pub mod engine;
pub mod query;
pub mod state;
pub mod submission;

pub use builder::{BuilderError, InventoryBuilder, InventoryFactories};
pub use cart::{Cart, CartError, CartLine};
pub use engine::{event_bus::EventBus, EngineError, InventoryEngine};
pub use query::{OrderQueryService, QueryError};
pub use state::{ApprovalStateMachine, OrderStateError};
pub use submission::{OrderSubmissionService, SubmissionError, SubmissionReceipt, SubmitOrder};
