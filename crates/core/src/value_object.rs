//! Value object trait: equality by value, not identity.
//!
//! A plan configuration or a priced cart line has no identity of its own; two of
//! them with the same attributes are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one with the new values.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct BillingContact {
///     name: String,
///     email: String,
/// }
///
/// impl ValueObject for BillingContact {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
