//! One atomic transformation step and its batch-application semantics
use crate::errors::ApplyError;
use crate::types::{AnimatableSection, IdentifiableType, ItemIdentity, ItemPath, SectionIdentity, Snapshot};
use std::collections::HashSet;
use std::fmt::Debug;

/// A section inserted (new index), deleted or updated (old index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionChange<I> {
    pub identity: I,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMove<I> {
    pub identity: I,
    pub from: usize,
    pub to: usize,
}

/// An item inserted (new path), deleted or updated (old path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange<I> {
    pub identity: I,
    pub path: ItemPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMove<I> {
    pub identity: I,
    pub from: ItemPath,
    pub to: ItemPath,
}

/// Net structural delta between two snapshots plus the state it leads to.
///
/// Deletes, updates and move sources address the snapshot the changeset is
/// applied to. Inserts and move destinations address `final_sections`. The
/// operations describe one batch, not a log: none of them assumes another
/// has already happened.
///
/// Ordering: deletes highest index first, inserts ascending, moves by
/// ascending destination, updates ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset<S: AnimatableSection> {
    pub final_sections: Snapshot<S>,

    pub inserted_sections: Vec<SectionChange<SectionIdentity<S>>>,
    pub deleted_sections: Vec<SectionChange<SectionIdentity<S>>>,
    pub updated_sections: Vec<SectionChange<SectionIdentity<S>>>,
    pub moved_sections: Vec<SectionMove<SectionIdentity<S>>>,

    pub inserted_items: Vec<ItemChange<ItemIdentity<S>>>,
    pub deleted_items: Vec<ItemChange<ItemIdentity<S>>>,
    pub updated_items: Vec<ItemChange<ItemIdentity<S>>>,
    pub moved_items: Vec<ItemMove<ItemIdentity<S>>>,
}

#[derive(Debug, Clone, Copy)]
enum Source<P> {
    Inserted,
    Old(P),
}

impl<S: AnimatableSection> Changeset<S> {
    /// A changeset with no operations leading to `final_sections`.
    pub fn empty(final_sections: Snapshot<S>) -> Self {
        Changeset {
            final_sections,
            inserted_sections: Vec::new(),
            deleted_sections: Vec::new(),
            updated_sections: Vec::new(),
            moved_sections: Vec::new(),
            inserted_items: Vec::new(),
            deleted_items: Vec::new(),
            updated_items: Vec::new(),
            moved_items: Vec::new(),
        }
    }

    pub fn operation_count(&self) -> usize {
        self.inserted_sections.len()
            + self.deleted_sections.len()
            + self.updated_sections.len()
            + self.moved_sections.len()
            + self.inserted_items.len()
            + self.deleted_items.len()
            + self.updated_items.len()
            + self.moved_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Apply this changeset as one batch to `prior`, the state a live list
    /// is showing, and return the resulting state.
    ///
    /// Inserted and updated content comes from `final_sections`; everything
    /// else keeps its content from `prior`. Fails without producing anything
    /// when `prior` does not match what the changeset expects, or when an
    /// insert or move destination names a different identity than
    /// `final_sections` holds there.
    pub fn apply_to(&self, prior: &Snapshot<S>) -> Result<Snapshot<S>, ApplyError> {
        let old = prior.sections();
        let target = self.final_sections.sections();

        for change in self.deleted_sections.iter().chain(&self.updated_sections) {
            expect_section(old, change.index, &change.identity)?;
        }
        for mv in &self.moved_sections {
            expect_section(old, mv.from, &mv.identity)?;
        }
        for change in self.deleted_items.iter().chain(&self.updated_items) {
            expect_item(old, change.path, &change.identity)?;
        }
        for mv in &self.moved_items {
            expect_item(old, mv.from, &mv.identity)?;
        }

        let removed: HashSet<usize> = self
            .deleted_sections
            .iter()
            .map(|c| c.index)
            .chain(self.moved_sections.iter().map(|m| m.from))
            .collect();
        let len = checked_len(
            old.len(),
            removed.len(),
            self.inserted_sections.len() + self.moved_sections.len(),
            target.len(),
            || "sections".to_string(),
        )?;

        let mut slots: Vec<Option<Source<usize>>> = vec![None; len];
        for ins in &self.inserted_sections {
            claim(&mut slots, ins.index, Source::Inserted, || format!("section {}", ins.index))?;
            expect_identity(&target[ins.index].identity(), &ins.identity, || {
                format!("final section {}", ins.index)
            })?;
        }
        for mv in &self.moved_sections {
            claim(&mut slots, mv.to, Source::Old(mv.from), || format!("section {}", mv.to))?;
            expect_identity(&target[mv.to].identity(), &mv.identity, || {
                format!("final section {}", mv.to)
            })?;
        }
        let sources = fill(
            slots,
            (0..old.len()).filter(|i| !removed.contains(i)),
            || "sections".to_string(),
        )?;

        let stray = self
            .inserted_items
            .iter()
            .map(|c| c.path)
            .chain(self.moved_items.iter().map(|m| m.to))
            .find(|path| !matches!(sources.get(path.section), Some(Source::Old(_))));
        if let Some(path) = stray {
            return Err(ApplyError::ItemTargetNotKept {
                location: path.to_string(),
            });
        }

        let updated_sections: HashSet<usize> =
            self.updated_sections.iter().map(|c| c.index).collect();
        let updated_items: HashSet<ItemPath> = self.updated_items.iter().map(|c| c.path).collect();

        let mut sections = Vec::with_capacity(len);
        for (new_idx, source) in sources.into_iter().enumerate() {
            let section = match source {
                Source::Inserted => target[new_idx].clone(),
                Source::Old(old_idx) => {
                    let items = self.rebuild_items(old, old_idx, new_idx, &updated_items)?;
                    let header = if updated_sections.contains(&old_idx) {
                        &target[new_idx]
                    } else {
                        &old[old_idx]
                    };
                    header.with_items(items)
                }
            };
            sections.push(section);
        }

        Ok(Snapshot::new(sections))
    }

    fn rebuild_items(
        &self,
        old: &[S],
        old_idx: usize,
        new_idx: usize,
        updated: &HashSet<ItemPath>,
    ) -> Result<Vec<S::Item>, ApplyError> {
        let old_items = old[old_idx].items();
        let target_items = self.final_sections.sections()[new_idx].items();

        let removed: HashSet<usize> = self
            .deleted_items
            .iter()
            .map(|c| c.path)
            .chain(self.moved_items.iter().map(|m| m.from))
            .filter(|path| path.section == old_idx)
            .map(|path| path.item)
            .collect();
        let inserted: Vec<&ItemChange<ItemIdentity<S>>> = self
            .inserted_items
            .iter()
            .filter(|c| c.path.section == new_idx)
            .collect();
        let moved_in: Vec<&ItemMove<ItemIdentity<S>>> = self
            .moved_items
            .iter()
            .filter(|m| m.to.section == new_idx)
            .collect();

        let len = checked_len(
            old_items.len(),
            removed.len(),
            inserted.len() + moved_in.len(),
            target_items.len(),
            || format!("section {new_idx}"),
        )?;

        let mut slots: Vec<Option<Source<ItemPath>>> = vec![None; len];
        for ins in inserted {
            let item = ins.path.item;
            claim(&mut slots, item, Source::Inserted, || format!("item {new_idx}:{item}"))?;
            expect_identity(&target_items[item].identity(), &ins.identity, || {
                format!("final item {new_idx}:{item}")
            })?;
        }
        for mv in moved_in {
            let item = mv.to.item;
            claim(&mut slots, item, Source::Old(mv.from), || format!("item {new_idx}:{item}"))?;
            expect_identity(&target_items[item].identity(), &mv.identity, || {
                format!("final item {new_idx}:{item}")
            })?;
        }
        let sources = fill(
            slots,
            (0..old_items.len())
                .filter(|i| !removed.contains(i))
                .map(|i| ItemPath::new(old_idx, i)),
            || format!("section {new_idx}"),
        )?;

        sources
            .into_iter()
            .enumerate()
            .map(|(new_item, source)| match source {
                Source::Inserted => Ok(target_items[new_item].clone()),
                Source::Old(path) if updated.contains(&path) => Ok(target_items[new_item].clone()),
                Source::Old(path) => lookup_item(old, path).cloned(),
            })
            .collect()
    }
}

/// `old - removed + added`, which must come out to `expected`.
fn checked_len(
    old: usize,
    removed: usize,
    added: usize,
    expected: usize,
    location: impl Fn() -> String,
) -> Result<usize, ApplyError> {
    let actual = (old + added).checked_sub(removed).unwrap_or(0);
    if actual != expected || removed > old {
        return Err(ApplyError::CountMismatch {
            location: location(),
            expected,
            actual,
        });
    }
    Ok(actual)
}

fn claim<P>(
    slots: &mut [Option<Source<P>>],
    index: usize,
    source: Source<P>,
    location: impl Fn() -> String,
) -> Result<(), ApplyError> {
    let len = slots.len();
    let slot = slots.get_mut(index).ok_or_else(|| ApplyError::CountMismatch {
        location: location(),
        expected: len,
        actual: index + 1,
    })?;
    if slot.is_some() {
        return Err(ApplyError::SlotConflict { location: location() });
    }
    *slot = Some(source);
    Ok(())
}

/// Fill the unclaimed slots with `remaining`, in order. Both must run out together.
fn fill<P>(
    slots: Vec<Option<Source<P>>>,
    remaining: impl Iterator<Item = P>,
    location: impl Fn() -> String,
) -> Result<Vec<Source<P>>, ApplyError> {
    let expected = slots.len();
    let mut remaining = remaining.peekable();
    let mut filled = Vec::with_capacity(expected);
    for slot in slots {
        match slot {
            Some(source) => filled.push(source),
            None => match remaining.next() {
                Some(p) => filled.push(Source::Old(p)),
                None => {
                    return Err(ApplyError::CountMismatch {
                        location: location(),
                        expected,
                        actual: filled.len(),
                    });
                }
            },
        }
    }
    if remaining.peek().is_some() {
        return Err(ApplyError::CountMismatch {
            location: location(),
            expected,
            actual: expected + remaining.count(),
        });
    }
    Ok(filled)
}

fn expect_section<S: IdentifiableType>(
    sections: &[S],
    index: usize,
    identity: &S::Identity,
) -> Result<(), ApplyError> {
    let section = sections.get(index).ok_or(ApplyError::SectionOutOfRange {
        index,
        len: sections.len(),
    })?;
    expect_identity(&section.identity(), identity, || format!("section {index}"))
}

fn lookup_item<S: AnimatableSection>(sections: &[S], path: ItemPath) -> Result<&S::Item, ApplyError> {
    let section = sections.get(path.section).ok_or(ApplyError::SectionOutOfRange {
        index: path.section,
        len: sections.len(),
    })?;
    section.items().get(path.item).ok_or(ApplyError::ItemOutOfRange {
        section: path.section,
        item: path.item,
        len: section.items().len(),
    })
}

fn expect_item<S: AnimatableSection>(
    sections: &[S],
    path: ItemPath,
    identity: &ItemIdentity<S>,
) -> Result<(), ApplyError> {
    let item = lookup_item(sections, path)?;
    expect_identity(&item.identity(), identity, || format!("item {path}"))
}

fn expect_identity<I: PartialEq + Debug>(
    actual: &I,
    expected: &I,
    location: impl Fn() -> String,
) -> Result<(), ApplyError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ApplyError::IdentityMismatch {
            location: location(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnimatableSectionModel, IdentifiableValue};

    type Section = AnimatableSectionModel<String, IdentifiableValue<u32>>;

    fn section(id: &str, items: &[u32]) -> Section {
        AnimatableSectionModel::new(
            id.to_string(),
            items.iter().copied().map(IdentifiableValue).collect(),
        )
    }

    #[test]
    fn empty_changeset_is_identity() {
        let snap = Snapshot::new(vec![section("a", &[1, 2]), section("b", &[3])]);
        let cs = Changeset::empty(snap.clone());
        assert!(cs.is_empty());
        assert_eq!(cs.apply_to(&snap).unwrap(), snap);
    }

    #[test]
    fn batch_uses_old_indices_for_deletes_and_new_indices_for_inserts() {
        let prior = Snapshot::new(vec![section("a", &[1, 2, 3])]);
        let target = Snapshot::new(vec![section("a", &[4, 1, 3])]);
        let mut cs = Changeset::empty(target.clone());
        cs.deleted_items.push(ItemChange {
            identity: 2,
            path: ItemPath::new(0, 1),
        });
        cs.inserted_items.push(ItemChange {
            identity: 4,
            path: ItemPath::new(0, 0),
        });
        assert_eq!(cs.apply_to(&prior).unwrap(), target);
    }

    #[test]
    fn stale_prior_is_rejected() {
        let prior = Snapshot::new(vec![section("a", &[1, 2])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[1])]));
        cs.deleted_items.push(ItemChange {
            identity: 9,
            path: ItemPath::new(0, 1),
        });
        assert!(matches!(
            cs.apply_to(&prior),
            Err(ApplyError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn missing_operation_is_a_count_mismatch() {
        let prior = Snapshot::new(vec![section("a", &[1, 2])]);
        let cs = Changeset::empty(Snapshot::new(vec![section("a", &[1])]));
        assert_eq!(
            cs.apply_to(&prior),
            Err(ApplyError::CountMismatch {
                location: "section 0".to_string(),
                expected: 1,
                actual: 2,
            })
        );
    }

    #[test]
    fn inserted_item_must_match_final_identity() {
        let prior = Snapshot::new(vec![section("a", &[1])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[1, 2])]));
        cs.inserted_items.push(ItemChange {
            identity: 5,
            path: ItemPath::new(0, 1),
        });
        assert_eq!(
            cs.apply_to(&prior),
            Err(ApplyError::IdentityMismatch {
                location: "final item 0:1".to_string(),
                expected: "5".to_string(),
                actual: "2".to_string(),
            })
        );
    }

    #[test]
    fn moved_item_must_match_final_identity() {
        let prior = Snapshot::new(vec![section("a", &[1, 2])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[2, 1])]));
        cs.moved_items.push(ItemMove {
            identity: 2,
            from: ItemPath::new(0, 1),
            to: ItemPath::new(0, 1),
        });
        assert!(matches!(
            cs.apply_to(&prior),
            Err(ApplyError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn item_insert_into_inserted_section_is_rejected() {
        let prior = Snapshot::new(vec![section("a", &[])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[]), section("b", &[4])]));
        cs.inserted_sections.push(SectionChange {
            identity: "b".to_string(),
            index: 1,
        });
        cs.inserted_items.push(ItemChange {
            identity: 4,
            path: ItemPath::new(1, 0),
        });
        assert_eq!(
            cs.apply_to(&prior),
            Err(ApplyError::ItemTargetNotKept {
                location: "1:0".to_string(),
            })
        );
    }

    #[test]
    fn item_move_past_last_section_is_rejected() {
        let prior = Snapshot::new(vec![section("a", &[1])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[])]));
        cs.moved_items.push(ItemMove {
            identity: 1,
            from: ItemPath::new(0, 0),
            to: ItemPath::new(3, 0),
        });
        assert!(matches!(
            cs.apply_to(&prior),
            Err(ApplyError::ItemTargetNotKept { .. })
        ));
    }

    #[test]
    fn two_inserts_on_one_slot_conflict() {
        let prior = Snapshot::new(vec![section("a", &[1])]);
        let mut cs = Changeset::empty(Snapshot::new(vec![section("a", &[1, 2, 3])]));
        for id in [2, 3] {
            cs.inserted_items.push(ItemChange {
                identity: id,
                path: ItemPath::new(0, 1),
            });
        }
        assert!(matches!(
            cs.apply_to(&prior),
            Err(ApplyError::SlotConflict { .. })
        ));
    }
}
