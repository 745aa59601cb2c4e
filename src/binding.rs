//! Drives a live list surface from a stream of snapshots.
//!
//! The data source keeps the last snapshot it actually applied and diffs
//! every new snapshot against it. Bursts are coalesced by [`SnapshotSlot`],
//! which only ever holds the newest pending snapshot.
use crate::changeset::Changeset;
use crate::diff_engine::diff;
use crate::errors::{ApplyError, ConfigError};
use crate::types::{AnimatableSection, Snapshot};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAnimation {
    Fade,
    Right,
    Left,
    Top,
    Bottom,
    None,
    Middle,
    #[default]
    Automatic,
}

/// Animations a surface should use for each kind of change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfiguration {
    pub insert_animation: RowAnimation,
    pub reload_animation: RowAnimation,
    pub delete_animation: RowAnimation,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub animation: AnimationConfiguration,
    /// Animate the very first snapshot in from an empty list instead of
    /// reloading.
    pub animate_initial_load: bool,
}

impl BindingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The live list/grid a data source mutates.
pub trait ListSurface<S: AnimatableSection> {
    /// Whether the surface is on screen. Detached surfaces are reloaded.
    fn is_attached(&self) -> bool;

    fn reload_all(&mut self, snapshot: &Snapshot<S>);

    /// Apply one changeset as a single animated batch.
    fn apply_changeset(
        &mut self,
        changeset: &Changeset<S>,
        animation: &AnimationConfiguration,
    ) -> Result<(), ApplyError>;
}

/// In-memory surface that tracks what it displays.
#[derive(Debug, Clone)]
pub struct MemoryList<S> {
    displayed: Snapshot<S>,
    attached: bool,
    reloads: usize,
    batches: usize,
}

impl<S> Default for MemoryList<S> {
    fn default() -> Self {
        MemoryList {
            displayed: Snapshot::default(),
            attached: true,
            reloads: 0,
            batches: 0,
        }
    }
}

impl<S> MemoryList<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> &Snapshot<S> {
        &self.displayed
    }

    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub fn reload_count(&self) -> usize {
        self.reloads
    }

    pub fn batch_count(&self) -> usize {
        self.batches
    }
}

impl<S: AnimatableSection> ListSurface<S> for MemoryList<S> {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn reload_all(&mut self, snapshot: &Snapshot<S>) {
        self.displayed = snapshot.clone();
        self.reloads += 1;
    }

    fn apply_changeset(
        &mut self,
        changeset: &Changeset<S>,
        _animation: &AnimationConfiguration,
    ) -> Result<(), ApplyError> {
        self.displayed = changeset.apply_to(&self.displayed)?;
        self.batches += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTransition {
    Animated,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// Nothing had been applied yet.
    Initial,
    Detached,
    DiffFailed,
    TransitionPolicy,
    ApplyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Animated { changesets: usize, operations: usize },
    Reloaded(ReloadReason),
}

pub type DecideViewTransition<S> = Box<dyn Fn(&[Changeset<S>]) -> ViewTransition + Send>;

/// Keeps a [`ListSurface`] in sync with incoming snapshots.
pub struct AnimatedDataSource<S: AnimatableSection, L> {
    surface: L,
    config: BindingConfig,
    applied: Option<Snapshot<S>>,
    decide_view_transition: DecideViewTransition<S>,
}

impl<S, L> AnimatedDataSource<S, L>
where
    S: AnimatableSection,
    L: ListSurface<S>,
{
    pub fn new(surface: L, config: BindingConfig) -> Self {
        AnimatedDataSource {
            surface,
            config,
            applied: None,
            decide_view_transition: Box::new(|_: &[Changeset<S>]| ViewTransition::Animated),
        }
    }

    /// Decide per update whether to animate the changesets or reload.
    pub fn with_view_transition<F>(mut self, decide: F) -> Self
    where
        F: Fn(&[Changeset<S>]) -> ViewTransition + Send + 'static,
    {
        self.decide_view_transition = Box::new(decide);
        self
    }

    pub fn surface(&self) -> &L {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut L {
        &mut self.surface
    }

    pub fn into_surface(self) -> L {
        self.surface
    }

    /// The snapshot the surface is known to display.
    pub fn applied(&self) -> Option<&Snapshot<S>> {
        self.applied.as_ref()
    }

    pub fn update(&mut self, next: Snapshot<S>) -> UpdateOutcome {
        let baseline = match &self.applied {
            Some(applied) => applied.clone(),
            None if self.config.animate_initial_load => Snapshot::default(),
            None => return self.reload(next, ReloadReason::Initial),
        };

        if !self.surface.is_attached() {
            return self.reload(next, ReloadReason::Detached);
        }

        let changesets = match diff(&baseline, &next) {
            Ok(changesets) => changesets,
            Err(err) => {
                warn!("Error while calculating differences: {err}");
                return self.reload(next, ReloadReason::DiffFailed);
            }
        };

        if (self.decide_view_transition)(changesets.as_slice()) == ViewTransition::Reload {
            return self.reload(next, ReloadReason::TransitionPolicy);
        }

        let mut operations = 0;
        for changeset in &changesets {
            if let Err(err) = self
                .surface
                .apply_changeset(changeset, &self.config.animation)
            {
                warn!("Surface rejected changeset: {err}");
                return self.reload(next, ReloadReason::ApplyFailed);
            }
            operations += changeset.operation_count();
            self.applied = Some(changeset.final_sections.clone());
        }

        trace!(
            "Applied {} changeset(s) with {} operation(s)",
            changesets.len(),
            operations
        );
        UpdateOutcome::Animated {
            changesets: changesets.len(),
            operations,
        }
    }

    fn reload(&mut self, next: Snapshot<S>, reason: ReloadReason) -> UpdateOutcome {
        debug!("Reloading surface ({reason:?}), {} section(s)", next.len());
        self.surface.reload_all(&next);
        self.applied = Some(next);
        UpdateOutcome::Reloaded(reason)
    }

    /// Apply snapshots from `slot` until it is closed and drained.
    /// Returns how many updates were applied.
    pub fn run(&mut self, slot: &SnapshotSlot<S>) -> usize {
        let mut updates = 0;
        while let Some(next) = slot.take() {
            self.update(next);
            updates += 1;
        }
        debug!(
            "Binding loop stopped after {updates} update(s), {} superseded",
            slot.superseded()
        );
        updates
    }

    /// Run the update loop on its own thread. The returned handle owns the
    /// thread; dropping it closes `slot` and waits for the loop to finish.
    pub fn spawn(self, slot: SnapshotSlot<S>) -> std::io::Result<BindingHandle<S, L>>
    where
        S: Send + Sync + 'static,
        L: Send + 'static,
    {
        let worker_slot = slot.clone();
        let mut source = self;
        let thread = thread::Builder::new()
            .name("sectioned-binding".to_string())
            .spawn(move || {
                source.run(&worker_slot);
                source
            })?;
        Ok(BindingHandle {
            slot,
            thread: Some(thread),
        })
    }
}

struct SlotState<S> {
    pending: Option<Snapshot<S>>,
    closed: bool,
    superseded: u64,
}

/// Single-slot hand-off of the latest pending snapshot.
///
/// Publishing replaces whatever is still pending, so a slow consumer only
/// ever sees the newest state.
pub struct SnapshotSlot<S> {
    shared: Arc<(Mutex<SlotState<S>>, Condvar)>,
}

impl<S> Clone for SnapshotSlot<S> {
    fn clone(&self) -> Self {
        SnapshotSlot {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> Default for SnapshotSlot<S> {
    fn default() -> Self {
        SnapshotSlot {
            shared: Arc::new((
                Mutex::new(SlotState {
                    pending: None,
                    closed: false,
                    superseded: 0,
                }),
                Condvar::new(),
            )),
        }
    }
}

impl<S> SnapshotSlot<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<S>> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false once the slot is closed.
    pub fn publish(&self, snapshot: Snapshot<S>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.pending.replace(snapshot).is_some() {
            state.superseded += 1;
        }
        self.shared.1.notify_one();
        true
    }

    /// Stop accepting snapshots. A snapshot still pending is delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.1.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of snapshots replaced before anyone took them.
    pub fn superseded(&self) -> u64 {
        self.lock().superseded
    }

    pub fn try_take(&self) -> Option<Snapshot<S>> {
        self.lock().pending.take()
    }

    /// Block until a snapshot is pending, or return `None` once the slot is
    /// closed and empty.
    pub fn take(&self) -> Option<Snapshot<S>> {
        let mut state = self.lock();
        loop {
            if let Some(snapshot) = state.pending.take() {
                return Some(snapshot);
            }
            if state.closed {
                return None;
            }
            state = self
                .shared
                .1
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Owns a spawned update loop.
pub struct BindingHandle<S: AnimatableSection, L> {
    slot: SnapshotSlot<S>,
    thread: Option<JoinHandle<AnimatedDataSource<S, L>>>,
}

impl<S: AnimatableSection, L> BindingHandle<S, L> {
    pub fn publish(&self, snapshot: Snapshot<S>) -> bool {
        self.slot.publish(snapshot)
    }

    pub fn slot(&self) -> &SnapshotSlot<S> {
        &self.slot
    }

    /// Close the slot, let the loop drain it and hand the data source back.
    /// `None` if the loop panicked.
    pub fn shutdown(mut self) -> Option<AnimatedDataSource<S, L>> {
        self.slot.close();
        self.thread.take()?.join().ok()
    }
}

impl<S: AnimatableSection, L> Drop for BindingHandle<S, L> {
    fn drop(&mut self) {
        self.slot.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Binding loop panicked");
            }
        }
    }
}
