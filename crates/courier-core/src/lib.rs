//! Core infrastructure for courier.
//!
//! This crate provides the shared functionality used across the courier
//! dispatch crates:
//! - Event system for observability
//! - The boxed error type produced by task bodies

pub mod events;

pub use events::{CourierEvent, EventListener, EventListeners, FnListener};

/// Boxed error returned by task bodies.
///
/// The dispatch core never inspects task failures beyond "this attempt
/// failed"; any error type works as long as it is `Send + Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
