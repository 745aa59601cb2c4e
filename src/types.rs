//! Identity model and immutable snapshots
use crate::errors::{DiffError, IdentityScope, Side};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// A value with a stable identity that survives across snapshots.
///
/// Identity decides *which* element is which. Content changes are
/// detected separately (`PartialEq` for items, [`AnimatableSection::value_eq`]
/// for sections).
pub trait IdentifiableType {
    type Identity: Hash + Eq + Clone + Debug;

    fn identity(&self) -> Self::Identity;
}

/// A section of a sectioned list: its own header content plus ordered items.
pub trait AnimatableSection: IdentifiableType + Clone {
    type Item: IdentifiableType + PartialEq + Clone;

    fn items(&self) -> &[Self::Item];

    /// Rebuild this section with the same header and a new item list.
    fn with_items(&self, items: Vec<Self::Item>) -> Self;

    /// Compares the section's own content, excluding items.
    fn value_eq(&self, other: &Self) -> bool;
}

pub type SectionIdentity<S> = <S as IdentifiableType>::Identity;
pub type ItemIdentity<S> = <<S as AnimatableSection>::Item as IdentifiableType>::Identity;

macro_rules! identifiable_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IdentifiableType for $ty {
                type Identity = $ty;

                fn identity(&self) -> Self::Identity {
                    self.clone()
                }
            }
        )*
    };
}

identifiable_by_value!(
    String,
    &'static str,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
);

/// Wraps a plain value that serves as its own identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifiableValue<T>(pub T);

impl<T> IdentifiableType for IdentifiableValue<T>
where
    T: Hash + Eq + Clone + Debug,
{
    type Identity = T;

    fn identity(&self) -> T {
        self.0.clone()
    }
}

/// Generic section: a header `model` and its `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimatableSectionModel<M, I> {
    pub model: M,
    pub items: Vec<I>,
}

impl<M, I> AnimatableSectionModel<M, I> {
    pub fn new(model: M, items: Vec<I>) -> Self {
        AnimatableSectionModel { model, items }
    }
}

impl<M, I> IdentifiableType for AnimatableSectionModel<M, I>
where
    M: IdentifiableType,
{
    type Identity = M::Identity;

    fn identity(&self) -> Self::Identity {
        self.model.identity()
    }
}

impl<M, I> AnimatableSection for AnimatableSectionModel<M, I>
where
    M: IdentifiableType + PartialEq + Clone,
    I: IdentifiableType + PartialEq + Clone,
{
    type Item = I;

    fn items(&self) -> &[I] {
        &self.items
    }

    fn with_items(&self, items: Vec<I>) -> Self {
        AnimatableSectionModel {
            model: self.model.clone(),
            items,
        }
    }

    fn value_eq(&self, other: &Self) -> bool {
        self.model == other.model
    }
}

/// Position of an item: section index, then item index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemPath {
    pub section: usize,
    pub item: usize,
}

impl ItemPath {
    pub fn new(section: usize, item: usize) -> Self {
        ItemPath { section, item }
    }
}

impl std::fmt::Display for ItemPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.section, self.item)
    }
}

/// Immutable ordered sections captured at one point in time.
///
/// Cloning shares the underlying storage. Construction does not check the
/// identity invariants; see [`Snapshot::validate`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot<S> {
    sections: Arc<[S]>,
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Snapshot {
            sections: Arc::clone(&self.sections),
        }
    }
}

impl<S: PartialEq> PartialEq for Snapshot<S> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sections, &other.sections) || self.sections == other.sections
    }
}

impl<S> Default for Snapshot<S> {
    fn default() -> Self {
        Snapshot {
            sections: Arc::from(Vec::new()),
        }
    }
}

impl<S> From<Vec<S>> for Snapshot<S> {
    fn from(sections: Vec<S>) -> Self {
        Snapshot::new(sections)
    }
}

impl<S> FromIterator<S> for Snapshot<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Snapshot::new(iter.into_iter().collect())
    }
}

impl<S> Snapshot<S> {
    pub fn new(sections: Vec<S>) -> Self {
        Snapshot {
            sections: Arc::from(sections),
        }
    }

    pub fn sections(&self) -> &[S] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, index: usize) -> Option<&S> {
        self.sections.get(index)
    }
}

impl<S: AnimatableSection> Snapshot<S> {
    pub fn item(&self, path: ItemPath) -> Option<&S::Item> {
        self.sections
            .get(path.section)
            .and_then(|section| section.items().get(path.item))
    }

    /// Total number of items across all sections.
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items().len()).sum()
    }

    /// Check the identity invariants: distinct section identities, and every
    /// item identity appearing at most once in the whole snapshot. Errors are
    /// tagged with `side`.
    pub fn validate(&self, side: Side) -> Result<(), DiffError> {
        self.index(side).map(|_| ())
    }

    /// Build identity → position indexes, failing on the first violation.
    pub(crate) fn index(&self, side: Side) -> Result<SnapshotIndex<S>, DiffError> {
        let mut sections = IndexMap::with_capacity(self.sections.len());
        let mut items = IndexMap::with_capacity(self.item_count());

        for (section_idx, section) in self.sections.iter().enumerate() {
            let id = section.identity();
            if sections.insert(id.clone(), section_idx).is_some() {
                return Err(DiffError::DuplicateIdentity {
                    scope: IdentityScope::Section,
                    side,
                    identity: format!("{:?}", id),
                    section: None,
                });
            }

            for (item_idx, item) in section.items().iter().enumerate() {
                match items.entry(item.identity()) {
                    Entry::Vacant(slot) => {
                        slot.insert(ItemPath::new(section_idx, item_idx));
                    }
                    Entry::Occupied(existing) => {
                        let first: &ItemPath = existing.get();
                        let identity = format!("{:?}", existing.key());
                        return Err(if first.section == section_idx {
                            DiffError::DuplicateIdentity {
                                scope: IdentityScope::Item,
                                side,
                                identity,
                                section: Some(section_idx),
                            }
                        } else {
                            DiffError::CrossSectionIdentityConflict {
                                side,
                                identity,
                                first_section: first.section,
                                second_section: section_idx,
                            }
                        });
                    }
                }
            }
        }

        Ok(SnapshotIndex { sections, items })
    }
}

/// Identity → position lookup tables for one snapshot.
pub(crate) struct SnapshotIndex<S: AnimatableSection> {
    pub sections: IndexMap<SectionIdentity<S>, usize>,
    pub items: IndexMap<ItemIdentity<S>, ItemPath>,
}
