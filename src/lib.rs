//! Diffing of sectioned lists into animated batch updates.
//!
//! [`diff`] compares two [`Snapshot`]s of sections and items, matched by
//! identity, and returns the [`Changeset`]s that turn one into the other.
//! [`binding`] drives a live list surface with them.
pub mod binding;
mod changeset;
pub mod converters;
mod diff_engine;
mod errors;
mod types;

pub use changeset::{Changeset, ItemChange, ItemMove, SectionChange, SectionMove};
pub use diff_engine::{DiffEngine, diff};
pub use errors::{ApplyError, ConfigError, DiffError, IdentityScope, PatchLogError, Side};
pub use types::{
    AnimatableSection, AnimatableSectionModel, IdentifiableType, IdentifiableValue, ItemIdentity,
    ItemPath, SectionIdentity, Snapshot,
};
