//! Domain layer - Core feed types with no external dependencies.

/// Typed feed events and the wheel color mapping.
pub mod event;
