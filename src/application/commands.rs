use crate::application::alarm_collection::{
    load_in_background, AlarmCollectionManager, CollectionError,
};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::events::{CollectionObserver, EventQueue, PendingOutput};
use crate::application::viewport::{MaterializedWindow, ViewportQuery};
use crate::application::wake_receiver::resolve_fired_wake;
use crate::domain::models::{Alarm, AlarmEdit, AlarmId};
use crate::domain::undo::ActionKind;
use crate::infrastructure::alarm_repository::SqliteAlarmStore;
use crate::infrastructure::config::load_alarm_defaults;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::wake_scheduler::{InMemoryWakeScheduler, ScheduledWake};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

type Manager = AlarmCollectionManager<SqliteAlarmStore, InMemoryWakeScheduler>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    store: Arc<SqliteAlarmStore>,
    scheduler: Arc<InMemoryWakeScheduler>,
    viewport: Arc<MaterializedWindow>,
    events: Arc<EventQueue>,
    manager: Mutex<Manager>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, CollectionError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let defaults = load_alarm_defaults(&bootstrap.config_dir)?;

        let store = Arc::new(SqliteAlarmStore::new(&bootstrap.database_path));
        let scheduler = Arc::new(InMemoryWakeScheduler::default());
        let viewport = Arc::new(MaterializedWindow::default());
        let events = Arc::new(EventQueue::default());
        let mut manager = AlarmCollectionManager::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Arc::clone(&viewport) as Arc<dyn ViewportQuery>,
            Arc::clone(&events) as Arc<dyn CollectionObserver>,
            defaults,
        );
        manager.initial_load()?;
        manager.resync_wakes()?;

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            store,
            scheduler,
            viewport,
            events,
            manager: Mutex::new(manager),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn command_error(&self, command: &str, error: &CollectionError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlarmView {
    #[serde(flatten)]
    pub alarm: Alarm,
    pub clock_time: String,
    pub meridian: String,
    pub day_summary: String,
    pub next_occurrence: Option<String>,
}

impl AlarmView {
    fn new(alarm: &Alarm, now: NaiveDateTime) -> Self {
        Self {
            alarm: alarm.clone(),
            clock_time: alarm.clock_time(),
            meridian: alarm.meridian().to_string(),
            day_summary: alarm.days.summary(),
            next_occurrence: alarm.next_occurrence(now).map(format_timestamp),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlacedAlarmResponse {
    pub position: usize,
    pub expanded: bool,
    pub alarm: AlarmView,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EditAlarmResponse {
    pub changed: bool,
    pub alarm: AlarmView,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UndoResponse {
    pub undone: Option<ActionKind>,
    pub alarms: Vec<AlarmView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NextAlarmResponse {
    pub alarm_id: AlarmId,
    pub position: usize,
    pub fire_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduledWakeResponse {
    pub alarm_id: AlarmId,
    pub fire_at: String,
}

impl From<ScheduledWake> for ScheduledWakeResponse {
    fn from(wake: ScheduledWake) -> Self {
        Self {
            alarm_id: wake.alarm_id,
            fire_at: format_timestamp(wake.fire_at),
        }
    }
}

pub fn list_alarms_impl(state: &AppState) -> Result<Vec<AlarmView>, CollectionError> {
    let manager = lock_manager(state)?;
    Ok(views(&manager))
}

pub fn get_alarm_impl(state: &AppState, position: usize) -> Result<AlarmView, CollectionError> {
    let manager = lock_manager(state)?;
    let alarm = manager
        .get(position)
        .ok_or(CollectionError::IndexOutOfRange {
            index: position,
            len: manager.len(),
        })?;
    Ok(AlarmView::new(alarm, now()))
}

pub fn add_alarm_impl(state: &AppState) -> Result<PlacedAlarmResponse, CollectionError> {
    let mut manager = lock_manager(state)?;
    let position = manager.add_new()?;
    info!(command = "add_alarm", position, "alarm created");
    placed(&mut manager, position)
}

pub fn copy_alarm_impl(
    state: &AppState,
    position: usize,
) -> Result<PlacedAlarmResponse, CollectionError> {
    let mut manager = lock_manager(state)?;
    let new_position = manager.copy(position)?;
    placed(&mut manager, new_position)
}

pub fn delete_alarm_impl(state: &AppState, position: usize) -> Result<AlarmView, CollectionError> {
    let mut manager = lock_manager(state)?;
    let removed = manager.delete(position)?;
    Ok(AlarmView::new(&removed, now()))
}

pub fn restore_alarm_impl(
    state: &AppState,
    alarm: Alarm,
    position: usize,
) -> Result<PlacedAlarmResponse, CollectionError> {
    let mut manager = lock_manager(state)?;
    manager.restore(alarm, position)?;
    placed(&mut manager, position)
}

pub fn move_alarm_impl(
    state: &AppState,
    from: usize,
    to: usize,
) -> Result<Vec<AlarmView>, CollectionError> {
    let mut manager = lock_manager(state)?;
    manager.move_alarm(from, to)?;
    Ok(views(&manager))
}

pub fn undo_impl(state: &AppState) -> Result<UndoResponse, CollectionError> {
    let mut manager = lock_manager(state)?;
    let undone = manager.undo()?;
    Ok(UndoResponse {
        undone,
        alarms: views(&manager),
    })
}

pub fn edit_alarm_impl(
    state: &AppState,
    position: usize,
    edit: AlarmEdit,
) -> Result<EditAlarmResponse, CollectionError> {
    let mut manager = lock_manager(state)?;
    let changed = manager.apply_edit(position, edit)?;
    let alarm = manager
        .get(position)
        .ok_or(CollectionError::IndexOutOfRange {
            index: position,
            len: manager.len(),
        })?;
    Ok(EditAlarmResponse {
        changed,
        alarm: AlarmView::new(alarm, now()),
    })
}

/// Records which rows the list currently renders. `None` for either bound
/// clears the window.
pub fn set_viewport_window_impl(
    state: &AppState,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<(), CollectionError> {
    let window = first.zip(last);
    if let Some((first, last)) = window.filter(|(first, last)| first > last) {
        return Err(InfraError::InvalidConfig(format!(
            "viewport window {first}..={last} is inverted"
        ))
        .into());
    }
    state.viewport.set(window);
    Ok(())
}

pub fn drain_events_impl(state: &AppState) -> PendingOutput {
    state.events.drain()
}

pub fn next_alarm_impl(state: &AppState) -> Result<Option<NextAlarmResponse>, CollectionError> {
    let manager = lock_manager(state)?;
    let next = manager.next_alarm().and_then(|(alarm, fire_at)| {
        manager.position_of(alarm.id).map(|position| NextAlarmResponse {
            alarm_id: alarm.id,
            position,
            fire_at: format_timestamp(fire_at),
        })
    });
    Ok(next)
}

pub fn list_scheduled_wakes_impl(
    state: &AppState,
) -> Result<Vec<ScheduledWakeResponse>, CollectionError> {
    let entries = state.scheduler.entries()?;
    Ok(entries.into_iter().map(ScheduledWakeResponse::from).collect())
}

/// Delivers a fired wake entry. Returns the alarm that should ring, if any.
pub fn fire_wake_impl(
    state: &AppState,
    alarm_id: AlarmId,
) -> Result<Option<AlarmView>, CollectionError> {
    let _manager = lock_manager(state)?;
    let fired = resolve_fired_wake(state.store.as_ref(), state.scheduler.as_ref(), alarm_id)?;
    Ok(fired.map(|alarm| AlarmView::new(&alarm, now())))
}

/// Re-reads the store off the command thread and replaces the list.
/// Mutating commands issued while the read is in flight fail with `NotLoaded`.
pub async fn reload_impl(state: &AppState) -> Result<Vec<AlarmView>, CollectionError> {
    lock_manager(state)?.begin_reload();
    let loaded = load_in_background(Arc::clone(&state.store)).await;
    let mut manager = lock_manager(state)?;
    let alarms = match loaded {
        Ok(alarms) => alarms,
        Err(error) => {
            manager.abort_reload();
            return Err(error);
        }
    };
    manager.install_loaded(alarms);
    manager.resync_wakes()?;
    Ok(views(&manager))
}

fn lock_manager(state: &AppState) -> Result<MutexGuard<'_, Manager>, CollectionError> {
    state.manager.lock().map_err(|error| {
        CollectionError::Infra(InfraError::LockPoisoned(format!(
            "alarm collection lock poisoned: {error}"
        )))
    })
}

fn placed(manager: &mut Manager, position: usize) -> Result<PlacedAlarmResponse, CollectionError> {
    let expanded = manager.take_was_just_added();
    let alarm = manager
        .get(position)
        .ok_or(CollectionError::IndexOutOfRange {
            index: position,
            len: manager.len(),
        })?;
    Ok(PlacedAlarmResponse {
        position,
        expanded,
        alarm: AlarmView::new(alarm, now()),
    })
}

fn views(manager: &Manager) -> Vec<AlarmView> {
    let now = now();
    manager
        .alarms()
        .iter()
        .map(|alarm| AlarmView::new(alarm, now))
        .collect()
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}
