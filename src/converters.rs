//! Flatten a changeset into a sequential patch log and JSON
use crate::changeset::Changeset;
use crate::errors::PatchLogError;
use crate::types::{AnimatableSection, IdentifiableType, ItemIdentity, ItemPath, SectionIdentity, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Patch action enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatchAction {
    Insert,
    Remove,
    Update,
    Move,
}

impl fmt::Display for PatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchAction::Insert => f.write_str("INSERT"),
            PatchAction::Remove => f.write_str("REMOVE"),
            PatchAction::Update => f.write_str("UPDATE"),
            PatchAction::Move => f.write_str("MOVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchTarget {
    Section,
    Item,
}

/// Section index, plus the item index for item patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLocation {
    pub section: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item: Option<usize>,
}

impl PatchLocation {
    fn section(section: usize) -> Self {
        PatchLocation { section, item: None }
    }
}

impl From<ItemPath> for PatchLocation {
    fn from(path: ItemPath) -> Self {
        PatchLocation {
            section: path.section,
            item: Some(path.item),
        }
    }
}

/// One entry of the flattened log.
///
/// Locations address the list as it stands when the patch is applied, after
/// every earlier patch in the log. A move removes the element at `from` and
/// then inserts it at `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub action: PatchAction,
    pub target: PatchTarget,
    pub identity: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<PatchLocation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub to: Option<PatchLocation>,
}

impl Patch {
    fn new<I: Serialize>(
        action: PatchAction,
        target: PatchTarget,
        identity: &I,
        from: Option<PatchLocation>,
        to: Option<PatchLocation>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Patch {
            action,
            target,
            identity: serde_json::to_value(identity)?,
            from,
            to,
        })
    }
}

/// Identities only, section by section. Patch locations are tracked against this.
type Layout<S> = Vec<(SectionIdentity<S>, Vec<ItemIdentity<S>>)>;

fn layout<S: AnimatableSection>(snapshot: &Snapshot<S>) -> Layout<S> {
    snapshot
        .sections()
        .iter()
        .map(|section| {
            let items = section.items().iter().map(|item| item.identity()).collect();
            (section.identity(), items)
        })
        .collect()
}

fn find_section<S: AnimatableSection>(
    state: &Layout<S>,
    identity: &SectionIdentity<S>,
) -> Result<usize, PatchLogError> {
    state
        .iter()
        .position(|(id, _)| id == identity)
        .ok_or_else(|| PatchLogError::Untracked {
            identity: format!("{:?}", identity),
        })
}

fn find_item<S: AnimatableSection>(
    state: &Layout<S>,
    identity: &ItemIdentity<S>,
) -> Result<ItemPath, PatchLogError> {
    state
        .iter()
        .enumerate()
        .find_map(|(section, (_, items))| {
            let item = items.iter().position(|id| id == identity)?;
            Some(ItemPath::new(section, item))
        })
        .ok_or_else(|| PatchLogError::Untracked {
            identity: format!("{:?}", identity),
        })
}

fn take_item<S: AnimatableSection>(
    state: &mut Layout<S>,
    path: ItemPath,
    identity: &ItemIdentity<S>,
) -> Result<(), PatchLogError> {
    let items = state
        .get_mut(path.section)
        .map(|(_, items)| items)
        .filter(|items| items.get(path.item) == Some(identity))
        .ok_or_else(|| PatchLogError::Untracked {
            identity: format!("{:?}", identity),
        })?;
    items.remove(path.item);
    Ok(())
}

/// Flatten `changeset` into a patch list for surfaces that apply one
/// operation at a time, starting from `prior`.
///
/// Every location is rebased onto a running copy of the list, so applying
/// the patches one after another to `prior` ends at the changeset's result.
/// Item removes come first, highest position first, then section removes.
/// Sections are then placed in final order, each one directly after its
/// final predecessor, followed by items the same way inside each section.
/// Updates come last and address final positions. An inserted section
/// carries its items; they get no patches of their own.
///
/// The changeset is applied to `prior` first, and a changeset that does not
/// fit is rejected before any patch is produced.
pub fn changeset_patches<S>(
    prior: &Snapshot<S>,
    changeset: &Changeset<S>,
) -> Result<Vec<Patch>, PatchLogError>
where
    S: AnimatableSection,
    SectionIdentity<S>: Serialize,
    ItemIdentity<S>: Serialize,
{
    let goal = layout(&changeset.apply_to(prior)?);
    let mut state = layout(prior);
    let mut patches = Vec::with_capacity(changeset.operation_count());

    let mut deleted_items: Vec<_> = changeset.deleted_items.iter().collect();
    deleted_items.sort_by(|a, b| b.path.cmp(&a.path));
    for change in deleted_items {
        take_item::<S>(&mut state, change.path, &change.identity)?;
        patches.push(Patch::new(
            PatchAction::Remove,
            PatchTarget::Item,
            &change.identity,
            Some(change.path.into()),
            None,
        )?);
    }

    let mut deleted_sections: Vec<_> = changeset.deleted_sections.iter().collect();
    deleted_sections.sort_by(|a, b| b.index.cmp(&a.index));
    for change in deleted_sections {
        if state.get(change.index).map(|(id, _)| id) != Some(&change.identity) {
            return Err(PatchLogError::Untracked {
                identity: format!("{:?}", change.identity),
            });
        }
        state.remove(change.index);
        patches.push(Patch::new(
            PatchAction::Remove,
            PatchTarget::Section,
            &change.identity,
            Some(PatchLocation::section(change.index)),
            None,
        )?);
    }

    let inserted: HashSet<&SectionIdentity<S>> =
        changeset.inserted_sections.iter().map(|c| &c.identity).collect();
    let moved: HashSet<&SectionIdentity<S>> =
        changeset.moved_sections.iter().map(|m| &m.identity).collect();
    for (index, (identity, items)) in goal.iter().enumerate() {
        let from = if inserted.contains(identity) {
            None
        } else if moved.contains(identity) {
            Some(find_section::<S>(&state, identity)?)
        } else {
            continue;
        };
        let entry = match from {
            Some(from) => state.remove(from),
            None => (identity.clone(), items.clone()),
        };
        let to = match index.checked_sub(1) {
            Some(prev) => find_section::<S>(&state, &goal[prev].0)? + 1,
            None => 0,
        };
        state.insert(to, entry);
        let (action, from) = match from {
            Some(from) => (PatchAction::Move, Some(PatchLocation::section(from))),
            None => (PatchAction::Insert, None),
        };
        patches.push(Patch::new(
            action,
            PatchTarget::Section,
            identity,
            from,
            Some(PatchLocation::section(to)),
        )?);
    }

    let placed: HashSet<&ItemIdentity<S>> = changeset
        .inserted_items
        .iter()
        .map(|c| &c.identity)
        .chain(changeset.moved_items.iter().map(|m| &m.identity))
        .collect();
    let moved_items: HashSet<&ItemIdentity<S>> =
        changeset.moved_items.iter().map(|m| &m.identity).collect();
    for (section, (_, items)) in goal.iter().enumerate() {
        for (index, identity) in items.iter().enumerate() {
            if !placed.contains(identity) {
                continue;
            }
            let from = if moved_items.contains(identity) {
                let path = find_item::<S>(&state, identity)?;
                take_item::<S>(&mut state, path, identity)?;
                Some(PatchLocation::from(path))
            } else {
                None
            };
            let to = match index.checked_sub(1) {
                Some(prev) => {
                    let prev = &items[prev];
                    let offset = state[section]
                        .1
                        .iter()
                        .position(|id| id == prev)
                        .ok_or_else(|| PatchLogError::Untracked {
                            identity: format!("{:?}", prev),
                        })?;
                    offset + 1
                }
                None => 0,
            };
            state[section].1.insert(to, identity.clone());
            let action = if from.is_some() {
                PatchAction::Move
            } else {
                PatchAction::Insert
            };
            patches.push(Patch::new(
                action,
                PatchTarget::Item,
                identity,
                from,
                Some(ItemPath::new(section, to).into()),
            )?);
        }
    }

    for change in &changeset.updated_sections {
        let at = find_section::<S>(&state, &change.identity)?;
        patches.push(Patch::new(
            PatchAction::Update,
            PatchTarget::Section,
            &change.identity,
            Some(PatchLocation::section(at)),
            None,
        )?);
    }
    for change in &changeset.updated_items {
        let at = find_item::<S>(&state, &change.identity)?;
        patches.push(Patch::new(
            PatchAction::Update,
            PatchTarget::Item,
            &change.identity,
            Some(at.into()),
            None,
        )?);
    }

    Ok(patches)
}

pub fn patches_to_json(patches: &[Patch]) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(patches)
}
