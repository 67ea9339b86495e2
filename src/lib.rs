//! Keeps an ordered alarm list, its persistent store and the OS wake
//! scheduler consistent across add, copy, delete, restore, move, undo and
//! in-place edits.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::alarm_collection::{
    load_in_background, AlarmCollectionManager, CollectionError,
};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::change_notifier::ChangeNotifier;
pub use application::commands::AppState;
pub use application::events::{
    CollectionEvent, CollectionObserver, EventQueue, PendingOutput, UserNotice,
};
pub use application::viewport::{MaterializedWindow, ViewportQuery};
pub use application::wake_receiver::resolve_fired_wake;
pub use domain::models::{Alarm, AlarmDefaults, AlarmEdit, AlarmId, DayMask};
pub use domain::undo::{ActionKind, UndoRecord};
pub use infrastructure::alarm_repository::{AlarmStore, InMemoryAlarmStore, SqliteAlarmStore};
pub use infrastructure::error::InfraError;
pub use infrastructure::wake_scheduler::{
    InMemoryWakeScheduler, NowProvider, ScheduledWake, WakeScheduler,
};
