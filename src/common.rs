//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers and labels, interned for cheap equality and a stable string
/// to order by.
pub type Id = internment::Intern<String>;

/// Intern a string slice as an [Id].
pub fn id(name: &str) -> Id {
    Id::from_ref(name)
}
