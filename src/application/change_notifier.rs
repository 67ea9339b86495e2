use crate::application::alarm_collection::CollectionError;
use crate::domain::models::Alarm;
use crate::infrastructure::alarm_repository::AlarmStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::wake_scheduler::WakeScheduler;
use std::sync::Arc;
use tracing::{debug, error};

/// Makes the scheduler hold exactly one entry for an enabled alarm and none
/// for a disabled one.
pub(crate) fn sync_wake(scheduler: &dyn WakeScheduler, alarm: &Alarm) -> Result<(), InfraError> {
    if alarm.enabled {
        scheduler.schedule(alarm)
    } else {
        scheduler.cancel(alarm)
    }
}

/// Pushes in-place field edits of a listed alarm to the store and scheduler.
pub struct ChangeNotifier<S, W>
where
    S: AlarmStore,
    W: WakeScheduler,
{
    store: Arc<S>,
    scheduler: Arc<W>,
}

impl<S, W> ChangeNotifier<S, W>
where
    S: AlarmStore,
    W: WakeScheduler,
{
    pub fn new(store: Arc<S>, scheduler: Arc<W>) -> Self {
        Self { store, scheduler }
    }

    /// The store is written first; if that fails nothing else is touched.
    pub fn on_field_changed(
        &self,
        previous: &Alarm,
        current: &Alarm,
    ) -> Result<(), CollectionError> {
        self.store
            .update(current)
            .map_err(|error| CollectionError::persistence(current.id, error))?;

        let result = match (previous.enabled, current.enabled) {
            (_, true) => self.scheduler.schedule(current),
            (true, false) => self.scheduler.cancel(current),
            (false, false) => Ok(()),
        };

        if let Err(scheduler_error) = result {
            error!(
                alarm_id = current.id,
                error = %scheduler_error,
                "wake re-sync failed after field change"
            );
            // An entry left over from the old fields would fire at the wrong time.
            if let Err(cancel_error) = self.scheduler.cancel(current) {
                error!(
                    alarm_id = current.id,
                    error = %cancel_error,
                    "stale wake entry could not be canceled"
                );
            }
            return Err(CollectionError::scheduler(current.id, scheduler_error));
        }

        debug!(alarm_id = current.id, enabled = current.enabled, "alarm fields synchronized");
        Ok(())
    }
}
