// /src/errors.rs
//! Typed errors for diffing, applying and configuring. Nothing here panics.
use std::fmt;
use thiserror::Error;

/// Which of the two compared snapshots an identity problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Initial,
    Final,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Initial => f.write_str("initial"),
            Side::Final => f.write_str("final"),
        }
    }
}

/// Uniqueness scope an identity was repeated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityScope {
    Section,
    Item,
}

impl fmt::Display for IdentityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityScope::Section => f.write_str("section"),
            IdentityScope::Item => f.write_str("item"),
        }
    }
}

/// Structural errors. A diff that fails produces no partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Duplicate {scope} identity {identity} in {side} snapshot{}", section_suffix(.section))]
    DuplicateIdentity {
        scope: IdentityScope,
        side: Side,
        identity: String,
        /// Containing section for item duplicates.
        section: Option<usize>,
    },

    #[error(
        "Item identity {identity} appears in sections {first_section} and {second_section} of the {side} snapshot"
    )]
    CrossSectionIdentityConflict {
        side: Side,
        identity: String,
        first_section: usize,
        second_section: usize,
    },
}

fn section_suffix(section: &Option<usize>) -> String {
    match section {
        Some(index) => format!(" (section {index})"),
        None => String::new(),
    }
}

/// Raised when a changeset does not fit the state it is applied to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Section index {index} is out of range ({len} sections)")]
    SectionOutOfRange { index: usize, len: usize },

    #[error("Item {section}:{item} is out of range ({len} items in section)")]
    ItemOutOfRange { section: usize, item: usize, len: usize },

    #[error("Expected identity {expected} at {location}, found {actual}")]
    IdentityMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("Two elements target {location}")]
    SlotConflict { location: String },

    #[error("Element count mismatch at {location}: expected {expected}, got {actual}")]
    CountMismatch {
        location: String,
        expected: usize,
        actual: usize,
    },

    /// Item inserts and moves may only land in sections that survive from
    /// the prior state. Inserted sections bring their items with them.
    #[error("Item {location} lands in a section that is not kept from the prior state")]
    ItemTargetNotKept { location: String },
}

/// Raised while flattening a changeset into a sequential patch log.
#[derive(Error, Debug)]
pub enum PatchLogError {
    #[error("Changeset does not apply to the given state: {0}")]
    Apply(#[from] ApplyError),

    #[error("Identity serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Identity {identity} is missing from the replayed state")]
    Untracked { identity: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid binding configuration: {0}")]
    Serde(#[from] serde_json::Error),
}
