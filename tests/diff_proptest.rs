//! Property-based tests for the sectioned diff.

use proptest::prelude::*;
use sectioned_reconciler::binding::{AnimatedDataSource, BindingConfig, MemoryList, UpdateOutcome};
use sectioned_reconciler::converters::{Patch, PatchAction, PatchTarget, changeset_patches};
use sectioned_reconciler::{
    AnimatableSectionModel, DiffError, IdentifiableType, Snapshot, diff,
};
use serde_json::{Value, json};

// =============================================================================
// Test model
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: u32,
    value: u8,
}

impl IdentifiableType for Row {
    type Identity = u32;

    fn identity(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    id: u8,
    title: u8,
}

impl IdentifiableType for Header {
    type Identity = u8;

    fn identity(&self) -> u8 {
        self.id
    }
}

type Section = AnimatableSectionModel<Header, Row>;

const SECTIONS: u8 = 6;
const ITEMS: u32 = 24;

/// Snapshots over a small shared universe of section and item identities, so
/// two independent draws overlap heavily.
fn arbitrary_snapshot() -> impl Strategy<Value = Snapshot<Section>> {
    (
        Just((0..SECTIONS).collect::<Vec<_>>()).prop_shuffle(),
        prop::collection::vec((any::<bool>(), 0..2u8), SECTIONS as usize),
        prop::collection::vec(prop::option::of((0..6usize, 0..3u8)), ITEMS as usize),
        Just((0..ITEMS).collect::<Vec<_>>()).prop_shuffle(),
    )
        .prop_map(|(order, headers, placement, item_order)| {
            let mut sections: Vec<Section> = order
                .iter()
                .filter(|&&id| headers[id as usize].0)
                .map(|&id| {
                    AnimatableSectionModel::new(
                        Header {
                            id,
                            title: headers[id as usize].1,
                        },
                        Vec::new(),
                    )
                })
                .collect();
            if !sections.is_empty() {
                let n = sections.len();
                for id in item_order {
                    if let Some((slot, value)) = placement[id as usize] {
                        sections[slot % n].items.push(Row { id, value });
                    }
                }
            }
            Snapshot::new(sections)
        })
}

fn apply_all(initial: &Snapshot<Section>, target: &Snapshot<Section>) -> Snapshot<Section> {
    let changesets = diff(initial, target).unwrap();
    let mut state = initial.clone();
    for changeset in &changesets {
        state = changeset.apply_to(&state).unwrap();
        assert_eq!(&state, &changeset.final_sections);
    }
    state
}

type Layout = Vec<(Value, Vec<Value>)>;

fn layout(snapshot: &Snapshot<Section>) -> Layout {
    snapshot
        .sections()
        .iter()
        .map(|s| (json!(s.model.id), s.items.iter().map(|r| json!(r.id)).collect()))
        .collect()
}

/// Apply a patch log one entry at a time. Inserted sections take their items
/// from `target`. Returns `None` when a patch does not name the element at
/// its `from` location.
fn replay(prior: &Snapshot<Section>, target: &Snapshot<Section>, patches: &[Patch]) -> Option<Layout> {
    let mut state = layout(prior);
    let sections = layout(target);
    for patch in patches {
        match patch.target {
            PatchTarget::Section => {
                let entry = match patch.from {
                    Some(from) => {
                        if state.get(from.section)?.0 != patch.identity {
                            return None;
                        }
                        if patch.action == PatchAction::Update {
                            continue;
                        }
                        state.remove(from.section)
                    }
                    None => sections.iter().find(|(id, _)| *id == patch.identity)?.clone(),
                };
                if let Some(to) = patch.to {
                    if to.section > state.len() {
                        return None;
                    }
                    state.insert(to.section, entry);
                }
            }
            PatchTarget::Item => {
                if let Some(from) = patch.from {
                    let items = &mut state.get_mut(from.section)?.1;
                    let at = from.item?;
                    if *items.get(at)? != patch.identity {
                        return None;
                    }
                    if patch.action == PatchAction::Update {
                        continue;
                    }
                    items.remove(at);
                }
                if let Some(to) = patch.to {
                    let items = &mut state.get_mut(to.section)?.1;
                    let at = to.item?;
                    if at > items.len() {
                        return None;
                    }
                    items.insert(at, patch.identity.clone());
                }
            }
        }
    }
    Some(state)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn applying_changesets_reconstructs_target(
        a in arbitrary_snapshot(),
        b in arbitrary_snapshot(),
    ) {
        prop_assert_eq!(apply_all(&a, &b), b);
    }

    #[test]
    fn patch_log_replays_to_target(a in arbitrary_snapshot(), b in arbitrary_snapshot()) {
        let mut state = a.clone();
        for cs in diff(&a, &b).unwrap() {
            let patches = changeset_patches(&state, &cs).unwrap();
            prop_assert_eq!(patches.len(), cs.operation_count());
            prop_assert_eq!(
                replay(&state, &cs.final_sections, &patches),
                Some(layout(&cs.final_sections))
            );
            state = cs.final_sections.clone();
        }
    }

    #[test]
    fn diff_against_self_is_empty(a in arbitrary_snapshot()) {
        let changesets = diff(&a, &a).unwrap();
        prop_assert!(changesets.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn operation_lists_are_ordered(a in arbitrary_snapshot(), b in arbitrary_snapshot()) {
        for cs in diff(&a, &b).unwrap() {
            prop_assert!(cs.deleted_sections.windows(2).all(|w| w[0].index > w[1].index));
            prop_assert!(cs.inserted_sections.windows(2).all(|w| w[0].index < w[1].index));
            prop_assert!(cs.deleted_items.windows(2).all(|w| w[0].path > w[1].path));
            prop_assert!(cs.inserted_items.windows(2).all(|w| w[0].path < w[1].path));
            prop_assert!(cs.moved_items.windows(2).all(|w| w[0].to < w[1].to));
            prop_assert!(cs.moved_sections.windows(2).all(|w| w[0].to < w[1].to));
        }
    }

    #[test]
    fn reordering_sections_only_moves_sections(a in arbitrary_snapshot()) {
        let mut reversed: Vec<Section> = a.sections().to_vec();
        reversed.reverse();
        let b = Snapshot::new(reversed);
        for cs in diff(&a, &b).unwrap() {
            prop_assert!(cs.moved_items.is_empty());
            prop_assert!(cs.inserted_items.is_empty());
            prop_assert!(cs.deleted_items.is_empty());
            prop_assert!(cs.updated_items.is_empty());
            prop_assert_eq!(cs.moved_sections.len(), a.len().saturating_sub(1));
        }
    }

    #[test]
    fn duplicate_item_is_always_rejected(a in arbitrary_snapshot(), b in arbitrary_snapshot()) {
        let mut sections: Vec<Section> = b.sections().to_vec();
        let Some(section) = sections.iter_mut().find(|s| !s.items.is_empty()) else {
            return Ok(());
        };
        let copy = section.items[0].clone();
        section.items.push(copy);
        let broken = Snapshot::new(sections);
        let is_duplicate = matches!(
            diff(&a, &broken),
            Err(DiffError::DuplicateIdentity { .. })
        );
        prop_assert!(is_duplicate);
    }

    #[test]
    fn data_source_tracks_latest_snapshot(
        snapshots in prop::collection::vec(arbitrary_snapshot(), 1..8),
    ) {
        let mut ds = AnimatedDataSource::new(MemoryList::new(), BindingConfig::default());
        for (n, snapshot) in snapshots.iter().enumerate() {
            let outcome = ds.update(snapshot.clone());
            if n > 0 {
                let animated = matches!(outcome, UpdateOutcome::Animated { .. });
                prop_assert!(animated);
            }
            prop_assert_eq!(ds.surface().displayed(), snapshot);
        }
        prop_assert_eq!(ds.surface().reload_count(), 1);
    }
}
