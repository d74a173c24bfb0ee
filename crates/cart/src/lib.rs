//! Cart aggregator.
//!
//! A cart is owned by one session and never persisted server-side. It holds at
//! most one line per configuration fingerprint.

pub mod cart;

pub use cart::{Cart, CartSnapshot};
