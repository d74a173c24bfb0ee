//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Orders and instances are entities: their status and linkage change over time
/// while the identifier stays the same.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
