//! Cart used to stage an order before submission.
//!
//! A cart is an explicit, single-owner value: it is created for one ordering
//! session, mutated synchronously and handed to the submission service by
//! reference. Lines hold a snapshot of the catalog item taken when it was
//! added; availability checks use that snapshot until [`Cart::refresh`]
//! replaces it.
//!
//! Every failing operation leaves the cart exactly as it was.

use inventory_types::CatalogItem;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors reported by cart operations. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
	/// The requested quantity exceeds what is available.
	#[error("Insufficient stock for {item_id}: {available} available, {remaining} more can be added")]
	InsufficientStock {
		item_id: String,
		available: u32,
		/// Units that can still be added on top of what the cart holds.
		remaining: u32,
	},
	/// Zero quantity, or anything but 1 for unique equipment.
	#[error("Invalid quantity {quantity} for {item_id}")]
	InvalidQuantity { item_id: String, quantity: u32 },
	/// Unique equipment can only appear once.
	#[error("Item {0} is already in the cart")]
	AlreadyInCart(String),
	#[error("Item {0} is not in the cart")]
	NotInCart(String),
}

/// One staged (item, quantity) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
	item: CatalogItem,
	quantity: u32,
}

impl CartLine {
	pub fn item(&self) -> &CatalogItem {
		&self.item
	}

	pub fn quantity(&self) -> u32 {
		self.quantity
	}

	/// Quantity times the item's unit price.
	pub fn subtotal(&self) -> Decimal {
		self.item.unit_price() * Decimal::from(self.quantity)
	}
}

/// Staging area for an order, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Cart {
	lines: Vec<CartLine>,
}

impl Cart {
	pub fn new() -> Self {
		Self::default()
	}

	fn position(&self, item_id: &str) -> Option<usize> {
		self.lines.iter().position(|l| l.item.id() == item_id)
	}

	/// Adds one unit of `item`.
	pub fn add_one(&mut self, item: &CatalogItem) -> Result<u32, CartError> {
		self.add_item(item, 1)
	}

	/// Adds `requested` units of `item`, merging into an existing line.
	///
	/// Returns the line's resulting quantity.
	pub fn add_item(&mut self, item: &CatalogItem, requested: u32) -> Result<u32, CartError> {
		if requested == 0 {
			return Err(CartError::InvalidQuantity {
				item_id: item.id().to_string(),
				quantity: 0,
			});
		}

		let existing = self.position(item.id());

		if item.is_unique() {
			if existing.is_some() {
				return Err(CartError::AlreadyInCart(item.id().to_string()));
			}
			if requested != item.max_quantity() {
				return Err(CartError::InvalidQuantity {
					item_id: item.id().to_string(),
					quantity: requested,
				});
			}
		}

		let in_cart = existing.map_or(0, |idx| self.lines[idx].quantity);
		let available = item.available_quantity();
		let wanted = in_cart.saturating_add(requested);
		if wanted > available {
			return Err(CartError::InsufficientStock {
				item_id: item.id().to_string(),
				available,
				remaining: available.saturating_sub(in_cart),
			});
		}

		match existing {
			Some(idx) => {
				let line = &mut self.lines[idx];
				line.item = item.clone();
				line.quantity = wanted;
			},
			None => self.lines.push(CartLine {
				item: item.clone(),
				quantity: wanted,
			}),
		}
		Ok(wanted)
	}

	/// Removes the line for `item_id`, if any.
	pub fn remove_item(&mut self, item_id: &str) {
		self.lines.retain(|l| l.item.id() != item_id);
	}

	/// Sets the quantity of an existing line. Anything below 1 removes it.
	pub fn update_quantity(&mut self, item_id: &str, quantity: u32) -> Result<(), CartError> {
		let idx = self
			.position(item_id)
			.ok_or_else(|| CartError::NotInCart(item_id.to_string()))?;

		if quantity < 1 {
			self.lines.remove(idx);
			return Ok(());
		}

		let line = &mut self.lines[idx];
		if line.item.is_unique() && quantity != 1 {
			return Err(CartError::InvalidQuantity {
				item_id: item_id.to_string(),
				quantity,
			});
		}
		let available = line.item.available_quantity();
		if quantity > available {
			return Err(CartError::InsufficientStock {
				item_id: item_id.to_string(),
				available,
				remaining: available.saturating_sub(line.quantity),
			});
		}

		line.quantity = quantity;
		Ok(())
	}

	/// How many more units of `item` could still be added.
	pub fn remaining_available(&self, item: &CatalogItem) -> u32 {
		let in_cart = self
			.position(item.id())
			.map_or(0, |idx| self.lines[idx].quantity);
		item.available_quantity().saturating_sub(in_cart)
	}

	/// Replaces the snapshot of an item already in the cart.
	///
	/// Quantities are left as they are; the next add or update checks them
	/// against the new availability. Returns false when the item has no line.
	pub fn refresh(&mut self, item: &CatalogItem) -> bool {
		match self.position(item.id()) {
			Some(idx) => {
				self.lines[idx].item = item.clone();
				true
			},
			None => false,
		}
	}

	/// Sum of quantity times unit price over all lines.
	pub fn total(&self) -> Decimal {
		self.lines.iter().map(CartLine::subtotal).sum()
	}

	pub fn clear(&mut self) {
		self.lines.clear();
	}

	pub fn lines(&self) -> &[CartLine] {
		&self.lines
	}

	/// Quantity of `item_id` in the cart, 0 when absent.
	pub fn quantity_of(&self, item_id: &str) -> u32 {
		self.position(item_id)
			.map_or(0, |idx| self.lines[idx].quantity)
	}

	pub fn len(&self) -> usize {
		self.lines.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lines.is_empty()
	}
}
