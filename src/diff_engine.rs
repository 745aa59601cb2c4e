//! Sectioned-collection diff engine with LIS-based move detection
use crate::changeset::{Changeset, ItemChange, ItemMove, SectionChange, SectionMove};
use crate::errors::{DiffError, Side};
use crate::types::{AnimatableSection, IdentifiableType, ItemPath, Snapshot, SnapshotIndex};

/// Compute the changesets that turn `initial` into `target`.
///
/// Both snapshots are validated first; on any identity violation nothing is
/// computed and the error is returned. Applying the returned changesets in
/// order to `initial` yields `target`.
pub fn diff<S: AnimatableSection>(
    initial: &Snapshot<S>,
    target: &Snapshot<S>,
) -> Result<Vec<Changeset<S>>, DiffError> {
    Ok(DiffEngine::new(initial, target)?.reconcile())
}

pub struct DiffEngine<'a, S: AnimatableSection> {
    initial: &'a Snapshot<S>,
    target: &'a Snapshot<S>,
    old_index: SnapshotIndex<S>,
    new_index: SnapshotIndex<S>,
    /// Whether each old section survives into the target, and vice versa.
    kept_old: Vec<bool>,
    kept_new: Vec<bool>,
    result: Changeset<S>,
}

impl<'a, S: AnimatableSection> DiffEngine<'a, S> {
    pub fn new(initial: &'a Snapshot<S>, target: &'a Snapshot<S>) -> Result<Self, DiffError> {
        let old_index = initial.index(Side::Initial)?;
        let new_index = target.index(Side::Final)?;

        let kept_old = initial
            .sections()
            .iter()
            .map(|s| new_index.sections.contains_key(&s.identity()))
            .collect();
        let kept_new = target
            .sections()
            .iter()
            .map(|s| old_index.sections.contains_key(&s.identity()))
            .collect();

        Ok(DiffEngine {
            initial,
            target,
            old_index,
            new_index,
            kept_old,
            kept_new,
            result: Changeset::empty(target.clone()),
        })
    }

    /// Run both diff phases and return the single batched changeset.
    pub fn reconcile(mut self) -> Vec<Changeset<S>> {
        let matched = self.diff_sections();
        for (old_section, new_section) in matched {
            self.diff_items(old_section, new_section);
        }
        self.sort_changes();
        vec![self.result]
    }

    /// Section phase. Returns matched `(old, new)` section pairs in new order.
    fn diff_sections(&mut self) -> Vec<(usize, usize)> {
        let old = self.initial.sections();
        let new = self.target.sections();

        for (old_idx, section) in old.iter().enumerate() {
            if !self.kept_old[old_idx] {
                self.result.deleted_sections.push(SectionChange {
                    identity: section.identity(),
                    index: old_idx,
                });
            }
        }

        let mut matched = Vec::with_capacity(new.len());
        for (new_idx, section) in new.iter().enumerate() {
            let identity = section.identity();
            let Some(&old_idx) = self.old_index.sections.get(&identity) else {
                self.result.inserted_sections.push(SectionChange {
                    identity,
                    index: new_idx,
                });
                continue;
            };
            if !old[old_idx].value_eq(section) {
                self.result.updated_sections.push(SectionChange {
                    identity,
                    index: old_idx,
                });
            }
            matched.push((old_idx, new_idx));
        }

        let old_order: Vec<usize> = matched.iter().map(|&(old_idx, _)| old_idx).collect();
        let stable = stable_positions(&old_order);
        for (pos, &(old_idx, new_idx)) in matched.iter().enumerate() {
            if !stable[pos] {
                self.result.moved_sections.push(SectionMove {
                    identity: new[new_idx].identity(),
                    from: old_idx,
                    to: new_idx,
                });
            }
        }

        matched
    }

    /// Item phase for one matched section pair.
    fn diff_items(&mut self, old_section: usize, new_section: usize) {
        let initial = self.initial;
        let old_items = initial.sections()[old_section].items();
        let new_items = self.target.sections()[new_section].items();

        for (old_item, item) in old_items.iter().enumerate() {
            let identity = item.identity();
            let survives = self
                .new_index
                .items
                .get(&identity)
                .is_some_and(|path| self.kept_new[path.section]);
            if !survives {
                self.result.deleted_items.push(ItemChange {
                    identity,
                    path: ItemPath::new(old_section, old_item),
                });
            }
        }

        // Items staying inside this section pair: (old item, new item).
        let mut in_place = Vec::new();
        for (new_item, item) in new_items.iter().enumerate() {
            let identity = item.identity();
            let to = ItemPath::new(new_section, new_item);
            let from = match self.old_index.items.get(&identity) {
                Some(&path) if self.kept_old[path.section] => path,
                // New, or coming out of a deleted section.
                _ => {
                    self.result.inserted_items.push(ItemChange { identity, path: to });
                    continue;
                }
            };

            if initial.sections()[from.section].items()[from.item] != *item {
                self.result.updated_items.push(ItemChange {
                    identity: identity.clone(),
                    path: from,
                });
            }

            if from.section == old_section {
                in_place.push((from.item, new_item));
            } else {
                self.result.moved_items.push(ItemMove { identity, from, to });
            }
        }

        let old_order: Vec<usize> = in_place.iter().map(|&(old_item, _)| old_item).collect();
        let stable = stable_positions(&old_order);
        for (pos, &(old_item, new_item)) in in_place.iter().enumerate() {
            if !stable[pos] {
                self.result.moved_items.push(ItemMove {
                    identity: new_items[new_item].identity(),
                    from: ItemPath::new(old_section, old_item),
                    to: ItemPath::new(new_section, new_item),
                });
            }
        }
    }

    fn sort_changes(&mut self) {
        let result = &mut self.result;
        result.inserted_sections.sort_by_key(|c| c.index);
        result.deleted_sections.sort_by(|a, b| b.index.cmp(&a.index));
        result.updated_sections.sort_by_key(|c| c.index);
        result.moved_sections.sort_by_key(|m| m.to);

        result.inserted_items.sort_by_key(|c| c.path);
        result.deleted_items.sort_by(|a, b| b.path.cmp(&a.path));
        result.updated_items.sort_by_key(|c| c.path);
        result.moved_items.sort_by_key(|m| m.to);
    }
}

/// Mark which positions of `seq` lie on one longest increasing subsequence.
/// Those elements keep their relative order; every other one has moved.
/// `lis::longest_increasing_subsequence` panics on an empty slice.
fn stable_positions(seq: &[usize]) -> Vec<bool> {
    let mut stable = vec![false; seq.len()];
    if seq.is_empty() {
        return stable;
    }
    for pos in lis::longest_increasing_subsequence(seq) {
        stable[pos] = true;
    }
    stable
}
