//! Event bus for broadcasting workflow events.
//!
//! Thin wrapper over a tokio broadcast channel. Publishing with no
//! subscribers is not an error worth surfacing, so callers typically discard
//! the result with `.ok()`.

use inventory_types::InventoryEvent;
use tokio::sync::broadcast;

/// Broadcasts [`InventoryEvent`]s to every subscriber.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<InventoryEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Creates a new receiver for events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning the number of receivers it reached.
	pub fn publish(
		&self,
		event: InventoryEvent,
	) -> Result<usize, broadcast::error::SendError<InventoryEvent>> {
		self.sender.send(event)
	}
}
