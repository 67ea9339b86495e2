use crate::application::change_notifier::{sync_wake, ChangeNotifier};
use crate::application::events::{CollectionEvent, CollectionObserver, UserNotice};
use crate::application::viewport::{materialized_range_around, ViewportQuery};
use crate::domain::id_allocator::allocate;
use crate::domain::models::{next_alarm, Alarm, AlarmDefaults, AlarmEdit, AlarmId};
use crate::domain::undo::{ActionKind, UndoRecord, UndoSlot};
use crate::infrastructure::alarm_repository::AlarmStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::wake_scheduler::{local_now, NowProvider, WakeScheduler};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

const MAX_ALARMS_MESSAGE: &str = "Max number of alarms created";
const ADD_FAILED_MESSAGE: &str = "Error occurred when adding alarm to database.";
const SCHEDULE_FAILED_MESSAGE: &str = "Error occurred when scheduling alarm.";
const DELETE_FAILED_MESSAGE: &str = "Error occurred when deleting alarm.";
const MOVE_FAILED_MESSAGE: &str = "Error occurred when moving alarm.";

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("alarm limit of {max} reached")]
    CapacityExceeded { max: usize },
    #[error("store rejected alarm {alarm_id}: {reason}")]
    PersistenceFailure { alarm_id: AlarmId, reason: String },
    #[error("wake scheduler rejected alarm {alarm_id}: {reason}")]
    SchedulerFailure { alarm_id: AlarmId, reason: String },
    #[error("no free alarm id left")]
    IdExhaustion,
    #[error("position {index} is out of range for {len} alarms")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("cannot move alarm from {from} to {to}")]
    InvalidMove { from: usize, to: usize },
    #[error("alarm list has not been loaded yet")]
    NotLoaded,
    #[error("alarm {0} is not in the list")]
    NotFound(AlarmId),
    #[error("invalid alarm: {0}")]
    InvalidAlarm(String),
    #[error("background load interrupted: {0}")]
    LoadInterrupted(String),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl CollectionError {
    pub(crate) fn persistence(alarm_id: AlarmId, reason: impl Display) -> Self {
        Self::PersistenceFailure {
            alarm_id,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn scheduler(alarm_id: AlarmId, reason: impl Display) -> Self {
        Self::SchedulerFailure {
            alarm_id,
            reason: reason.to_string(),
        }
    }
}

/// Reads the full persisted list on a blocking worker thread. Publish the
/// result with [`AlarmCollectionManager::install_loaded`].
pub async fn load_in_background<S>(store: Arc<S>) -> Result<Vec<Alarm>, CollectionError>
where
    S: AlarmStore + 'static,
{
    let alarms = tokio::task::spawn_blocking(move || store.read_all())
        .await
        .map_err(|error| CollectionError::LoadInterrupted(error.to_string()))??;
    Ok(alarms)
}

/// A failed external swap, and whether the stored order had already been swapped.
struct SwapFailure {
    error: CollectionError,
    store_swapped: bool,
}

impl SwapFailure {
    fn before_store(error: CollectionError) -> Self {
        Self {
            error,
            store_swapped: false,
        }
    }
}

/// Owns the ordered alarm list and keeps it, the store and the wake scheduler
/// in step. Calls must be serialized by the owner.
pub struct AlarmCollectionManager<S, W>
where
    S: AlarmStore,
    W: WakeScheduler,
{
    alarms: Vec<Alarm>,
    loaded: bool,
    reload_pending: bool,
    store: Arc<S>,
    scheduler: Arc<W>,
    notifier: ChangeNotifier<S, W>,
    viewport: Arc<dyn ViewportQuery>,
    observer: Arc<dyn CollectionObserver>,
    undo: UndoSlot,
    defaults: AlarmDefaults,
    was_just_added: bool,
    now_provider: NowProvider,
}

impl<S, W> AlarmCollectionManager<S, W>
where
    S: AlarmStore,
    W: WakeScheduler,
{
    pub fn new(
        store: Arc<S>,
        scheduler: Arc<W>,
        viewport: Arc<dyn ViewportQuery>,
        observer: Arc<dyn CollectionObserver>,
        defaults: AlarmDefaults,
    ) -> Self {
        Self {
            alarms: Vec::new(),
            loaded: false,
            reload_pending: false,
            notifier: ChangeNotifier::new(Arc::clone(&store), Arc::clone(&scheduler)),
            store,
            scheduler,
            viewport,
            observer,
            undo: UndoSlot::default(),
            defaults,
            was_just_added: false,
            now_provider: local_now(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, position: usize) -> Option<&Alarm> {
        self.alarms.get(position)
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn position_of(&self, alarm_id: AlarmId) -> Option<usize> {
        self.alarms.iter().position(|alarm| alarm.id == alarm_id)
    }

    pub fn defaults(&self) -> &AlarmDefaults {
        &self.defaults
    }

    pub fn pending_undo(&self) -> Option<&UndoRecord> {
        self.undo.peek()
    }

    /// Whether the most recently inserted row should be shown expanded.
    /// Reading the flag clears it, so only the first bound row sees it.
    pub fn take_was_just_added(&mut self) -> bool {
        std::mem::take(&mut self.was_just_added)
    }

    pub fn next_alarm(&self) -> Option<(&Alarm, NaiveDateTime)> {
        next_alarm(&self.alarms, (self.now_provider)())
    }

    /// Replaces the list with the full persisted set.
    pub fn initial_load(&mut self) -> Result<(), CollectionError> {
        let alarms = self.store.read_all()?;
        self.install_loaded(alarms);
        Ok(())
    }

    pub fn install_loaded(&mut self, alarms: Vec<Alarm>) {
        self.alarms = alarms;
        self.loaded = true;
        self.reload_pending = false;
        self.undo.consume();
        self.was_just_added = false;
        self.viewport.reset_reorder_tracking();
        self.observer.on_event(CollectionEvent::CollectionReplaced);
        info!(count = self.alarms.len(), "alarm list loaded");
    }

    /// Closes the load barrier ahead of a background read. Until
    /// [`Self::install_loaded`] or [`Self::abort_reload`] runs, every mutating
    /// operation fails with `NotLoaded`, so nothing written in the meantime is
    /// missed by the list being read.
    pub fn begin_reload(&mut self) {
        self.reload_pending |= self.loaded;
        self.loaded = false;
        info!(count = self.alarms.len(), "alarm list reload started");
    }

    /// Reopens the barrier after a failed background read. The list was not
    /// mutated while closed, so it still matches the store. A list that was
    /// never loaded stays closed.
    pub fn abort_reload(&mut self) {
        self.loaded = std::mem::take(&mut self.reload_pending);
        warn!(loaded = self.loaded, "alarm list reload abandoned");
    }

    /// Re-registers every listed alarm with the scheduler. Each alarm is
    /// attempted; the first failure is returned.
    pub fn resync_wakes(&self) -> Result<(), CollectionError> {
        self.ensure_loaded()?;
        let mut first_failure = None;
        for alarm in &self.alarms {
            if let Err(error) = sync_wake(self.scheduler.as_ref(), alarm) {
                error!(alarm_id = alarm.id, %error, "wake entry could not be synchronized");
                first_failure.get_or_insert(CollectionError::scheduler(alarm.id, error));
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Inserts `alarm` at `position`. Either the store, the scheduler and the
    /// list all gain the alarm, or none of them do.
    pub fn add(&mut self, alarm: Alarm, position: usize) -> Result<(), CollectionError> {
        self.ensure_loaded()?;
        self.check_capacity()?;
        if position > self.alarms.len() {
            return Err(self.out_of_range(position));
        }
        alarm.validate().map_err(CollectionError::InvalidAlarm)?;
        if self.position_of(alarm.id).is_some() {
            return Err(CollectionError::InvalidAlarm(format!(
                "alarm id {} is already in use",
                alarm.id
            )));
        }

        let stored = match self.store.add(&alarm, position) {
            Ok(row_id) if row_id >= 0 => Ok(()),
            Ok(row_id) => Err(format!("store returned row id {row_id}")),
            Err(error) => Err(error.to_string()),
        };
        if let Err(reason) = stored {
            error!(alarm_id = alarm.id, position, %reason, "alarm could not be stored");
            self.observer.on_notice(UserNotice::dismissible(ADD_FAILED_MESSAGE));
            return Err(CollectionError::persistence(alarm.id, reason));
        }

        self.was_just_added = true;
        if let Err(scheduler_error) = sync_wake(self.scheduler.as_ref(), &alarm) {
            self.was_just_added = false;
            error!(
                alarm_id = alarm.id,
                error = %scheduler_error,
                "alarm could not be scheduled, removing stored row"
            );
            if let Err(rollback_error) = self.store.delete(&alarm) {
                error!(
                    alarm_id = alarm.id,
                    error = %rollback_error,
                    "stored row could not be rolled back"
                );
            }
            self.observer.on_notice(UserNotice::dismissible(SCHEDULE_FAILED_MESSAGE));
            return Err(CollectionError::scheduler(alarm.id, scheduler_error));
        }

        info!(alarm_id = alarm.id, position, "alarm added");
        self.alarms.insert(position, alarm);
        self.observer.on_event(CollectionEvent::ItemInserted { position });
        Ok(())
    }

    /// Appends `alarm` and asks the list to scroll to it.
    pub fn push(&mut self, alarm: Alarm) -> Result<usize, CollectionError> {
        let position = self.alarms.len();
        self.add(alarm, position)?;
        self.observer.on_event(CollectionEvent::ScrollTo { position });
        Ok(position)
    }

    /// Appends a fresh alarm seeded from the configured defaults at the current time.
    pub fn add_new(&mut self) -> Result<usize, CollectionError> {
        self.ensure_loaded()?;
        self.check_capacity()?;
        let id = self.allocate_id()?;
        let alarm = Alarm::from_defaults(id, (self.now_provider)().time(), &self.defaults);
        self.push(alarm)
    }

    pub fn delete(&mut self, position: usize) -> Result<Alarm, CollectionError> {
        self.ensure_loaded()?;
        let alarm = self
            .alarms
            .get(position)
            .cloned()
            .ok_or_else(|| self.out_of_range(position))?;
        let visible =
            materialized_range_around(self.viewport.as_ref(), position, self.alarms.len());

        if let Err(scheduler_error) = self.scheduler.cancel(&alarm) {
            error!(
                alarm_id = alarm.id,
                error = %scheduler_error,
                "wake entry could not be canceled"
            );
            self.observer.on_notice(UserNotice::dismissible(DELETE_FAILED_MESSAGE));
            return Err(CollectionError::scheduler(alarm.id, scheduler_error));
        }
        if let Err(store_error) = self.store.delete(&alarm) {
            error!(alarm_id = alarm.id, error = %store_error, "stored row could not be deleted");
            if let Err(resync_error) = sync_wake(self.scheduler.as_ref(), &alarm) {
                error!(
                    alarm_id = alarm.id,
                    error = %resync_error,
                    "wake entry could not be restored"
                );
            }
            self.observer.on_notice(UserNotice::dismissible(DELETE_FAILED_MESSAGE));
            return Err(CollectionError::persistence(alarm.id, store_error));
        }

        self.alarms.remove(position);
        self.observer.on_event(CollectionEvent::ItemRemoved { position });
        if let Some((first, last)) = visible {
            // The window was measured before the removal; the list is one shorter now.
            let last = last.min(self.alarms.len().saturating_sub(1));
            if !self.alarms.is_empty() && first <= last {
                self.observer
                    .on_event(CollectionEvent::RangeChanged { first, last });
            }
        }

        info!(alarm_id = alarm.id, position, "alarm deleted");
        self.record_undo(alarm.clone(), position, ActionKind::Delete);
        Ok(alarm)
    }

    /// Appends a duplicate of the alarm at `position` under a new id.
    pub fn copy(&mut self, position: usize) -> Result<usize, CollectionError> {
        self.ensure_loaded()?;
        let source = self
            .alarms
            .get(position)
            .cloned()
            .ok_or_else(|| self.out_of_range(position))?;
        self.check_capacity()?;

        let copy = source.duplicate(self.allocate_id()?);
        let new_position = self.push(copy.clone())?;

        info!(source_id = source.id, alarm_id = copy.id, new_position, "alarm copied");
        self.record_undo(copy, new_position, ActionKind::Copy);
        Ok(new_position)
    }

    /// Re-inserts a previously removed alarm at `position`.
    pub fn restore(&mut self, alarm: Alarm, position: usize) -> Result<(), CollectionError> {
        self.add(alarm.clone(), position)?;
        info!(alarm_id = alarm.id, position, "alarm restored");
        self.record_undo(alarm, position, ActionKind::Restore);
        Ok(())
    }

    /// Reverses the last copy, delete or restore. Returns the kind that was
    /// undone, or `None` when there was nothing to undo.
    pub fn undo(&mut self) -> Result<Option<ActionKind>, CollectionError> {
        self.ensure_loaded()?;
        let Some(record) = self.undo.consume() else {
            return Ok(None);
        };

        let result = match record.kind {
            ActionKind::Copy | ActionKind::Restore => self
                .locate(&record)
                .and_then(|position| self.delete(position).map(|_| ())),
            ActionKind::Delete => {
                let position = record.position.min(self.alarms.len());
                self.restore(record.alarm.clone(), position)
            }
        };

        match result {
            Ok(()) => Ok(Some(record.kind)),
            Err(error) => {
                warn!(kind = ?record.kind, alarm_id = record.alarm.id, %error, "undo failed");
                if self.undo.peek().is_none() {
                    self.undo.set(record.alarm, record.position, record.kind);
                }
                Err(error)
            }
        }
    }

    /// Swaps the alarms at `from` and `to` in the list and in the store, then
    /// re-registers both wake entries from their own fields.
    pub fn move_alarm(&mut self, from: usize, to: usize) -> Result<(), CollectionError> {
        self.ensure_loaded()?;
        let len = self.alarms.len();
        for index in [from, to] {
            if index >= len {
                return Err(self.out_of_range(index));
            }
        }
        if from == to {
            return Err(CollectionError::InvalidMove { from, to });
        }

        self.alarms.swap(from, to);
        let moved = self.alarms[to].clone();
        let displaced = self.alarms[from].clone();

        if let Err(SwapFailure {
            error,
            store_swapped,
        }) = self.swap_externally(&moved, &displaced)
        {
            self.alarms.swap(from, to);
            if store_swapped {
                // Swapping the same pair again restores the stored order.
                if let Err(revert_error) = self.store.swap_order(&moved, &displaced) {
                    error!(
                        moved_id = moved.id,
                        displaced_id = displaced.id,
                        error = %revert_error,
                        "stored order could not be swapped back"
                    );
                }
            }
            for alarm in [&moved, &displaced] {
                if let Err(resync_error) = sync_wake(self.scheduler.as_ref(), alarm) {
                    error!(
                        alarm_id = alarm.id,
                        error = %resync_error,
                        "wake entry could not be restored"
                    );
                }
            }
            warn!(from, to, %error, "alarm move aborted");
            self.observer.on_notice(UserNotice::dismissible(MOVE_FAILED_MESSAGE));
            return Err(error);
        }

        info!(from, to, "alarm moved");
        self.observer.on_event(CollectionEvent::ItemMoved { from, to });
        Ok(())
    }

    /// Applies one field edit to the alarm at `position`. Returns whether
    /// anything changed; unchanged edits touch neither store nor scheduler.
    pub fn apply_edit(
        &mut self,
        position: usize,
        edit: AlarmEdit,
    ) -> Result<bool, CollectionError> {
        self.ensure_loaded()?;
        let mut updated = self
            .alarms
            .get(position)
            .cloned()
            .ok_or_else(|| self.out_of_range(position))?;
        if !updated.apply(edit).map_err(CollectionError::InvalidAlarm)? {
            return Ok(false);
        }
        self.on_field_changed(updated)?;
        Ok(true)
    }

    /// Takes the edited copy of a listed alarm and re-synchronizes store and
    /// scheduler for it. A rejected store write leaves the list untouched.
    pub fn on_field_changed(&mut self, alarm: Alarm) -> Result<(), CollectionError> {
        self.ensure_loaded()?;
        let position = self
            .position_of(alarm.id)
            .ok_or(CollectionError::NotFound(alarm.id))?;
        alarm.validate().map_err(CollectionError::InvalidAlarm)?;

        let result = self.notifier.on_field_changed(&self.alarms[position], &alarm);
        if matches!(result, Err(CollectionError::PersistenceFailure { .. })) {
            return result;
        }
        self.alarms[position] = alarm;
        result
    }

    fn swap_externally(&self, moved: &Alarm, displaced: &Alarm) -> Result<(), SwapFailure> {
        for alarm in [moved, displaced] {
            self.scheduler.cancel(alarm).map_err(|error| {
                SwapFailure::before_store(CollectionError::scheduler(alarm.id, error))
            })?;
        }
        self.store.swap_order(moved, displaced).map_err(|error| {
            SwapFailure::before_store(CollectionError::persistence(moved.id, error))
        })?;
        for alarm in [moved, displaced] {
            sync_wake(self.scheduler.as_ref(), alarm).map_err(|error| SwapFailure {
                error: CollectionError::scheduler(alarm.id, error),
                store_swapped: true,
            })?;
        }
        Ok(())
    }

    fn locate(&self, record: &UndoRecord) -> Result<usize, CollectionError> {
        match self.alarms.get(record.position) {
            Some(alarm) if alarm.id == record.alarm.id => Ok(record.position),
            _ => self
                .position_of(record.alarm.id)
                .ok_or(CollectionError::NotFound(record.alarm.id)),
        }
    }

    fn record_undo(&mut self, alarm: Alarm, position: usize, kind: ActionKind) {
        self.undo.set(alarm, position, kind);
        self.observer.on_notice(UserNotice::undo(kind.message()));
    }

    fn allocate_id(&self) -> Result<AlarmId, CollectionError> {
        let used: HashSet<AlarmId> = self.alarms.iter().map(|alarm| alarm.id).collect();
        allocate(&used).ok_or_else(|| {
            error!(used = used.len(), "alarm id space exhausted");
            CollectionError::IdExhaustion
        })
    }

    fn check_capacity(&self) -> Result<(), CollectionError> {
        let max = self.defaults.max_alarms;
        if self.alarms.len() >= max {
            warn!(max, "alarm limit reached");
            self.observer.on_notice(UserNotice::dismissible(MAX_ALARMS_MESSAGE));
            return Err(CollectionError::CapacityExceeded { max });
        }
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<(), CollectionError> {
        if self.loaded {
            Ok(())
        } else {
            Err(CollectionError::NotLoaded)
        }
    }

    fn out_of_range(&self, index: usize) -> CollectionError {
        CollectionError::IndexOutOfRange {
            index,
            len: self.alarms.len(),
        }
    }
}
