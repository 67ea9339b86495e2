use crate::domain::models::{Alarm, AlarmId};
use crate::infrastructure::error::InfraError;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_now() -> NowProvider {
    Arc::new(|| Local::now().naive_local())
}

/// OS-level wake-up facility. Entries are derived only from the alarm's own
/// fields, so scheduling an already scheduled alarm replaces its entry.
pub trait WakeScheduler: Send + Sync {
    fn schedule(&self, alarm: &Alarm) -> Result<(), InfraError>;
    fn cancel(&self, alarm: &Alarm) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduledWake {
    pub alarm_id: AlarmId,
    pub fire_at: NaiveDateTime,
}

pub struct InMemoryWakeScheduler {
    entries: Mutex<BTreeMap<AlarmId, ScheduledWake>>,
    now_provider: NowProvider,
}

impl Default for InMemoryWakeScheduler {
    fn default() -> Self {
        Self::new(local_now())
    }
}

impl InMemoryWakeScheduler {
    pub fn new(now_provider: NowProvider) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            now_provider,
        }
    }

    pub fn entries(&self) -> Result<Vec<ScheduledWake>, InfraError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    pub fn entry(&self, alarm_id: AlarmId) -> Result<Option<ScheduledWake>, InfraError> {
        Ok(self.lock()?.get(&alarm_id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<AlarmId, ScheduledWake>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("wake scheduler lock poisoned: {error}")))
    }
}

impl WakeScheduler for InMemoryWakeScheduler {
    fn schedule(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let fire_at = alarm.next_occurrence((self.now_provider)()).ok_or_else(|| {
            InfraError::Scheduler(format!("alarm {} has no upcoming occurrence", alarm.id))
        })?;
        self.lock()?.insert(
            alarm.id,
            ScheduledWake {
                alarm_id: alarm.id,
                fire_at,
            },
        );
        Ok(())
    }

    fn cancel(&self, alarm: &Alarm) -> Result<(), InfraError> {
        self.lock()?.remove(&alarm.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::tests::sample_alarm;
    use chrono::NaiveDate;

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            NaiveDate::from_ymd_opt(2026, 2, 16)
                .expect("valid date")
                .and_hms_opt(6, 0, 0)
                .expect("valid time")
        })
    }

    #[test]
    fn schedule_replaces_existing_entry() {
        let scheduler = InMemoryWakeScheduler::new(fixed_now());
        let mut alarm = sample_alarm(1);
        scheduler.schedule(&alarm).expect("schedule");

        alarm.hour = 9;
        scheduler.schedule(&alarm).expect("reschedule");

        let entries = scheduler.entries().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fire_at.format("%H:%M").to_string(), "09:30");
    }

    #[test]
    fn cancel_is_idempotent() {
        let scheduler = InMemoryWakeScheduler::new(fixed_now());
        let alarm = sample_alarm(1);
        scheduler.schedule(&alarm).expect("schedule");
        scheduler.cancel(&alarm).expect("cancel");
        scheduler.cancel(&alarm).expect("cancel again");
        assert_eq!(scheduler.entry(1).expect("entry"), None);
    }

    #[test]
    fn disabled_alarm_cannot_be_scheduled() {
        let scheduler = InMemoryWakeScheduler::new(fixed_now());
        let mut alarm = sample_alarm(1);
        alarm.enabled = false;
        assert!(matches!(
            scheduler.schedule(&alarm),
            Err(InfraError::Scheduler(_))
        ));
        assert!(scheduler.entries().expect("entries").is_empty());
    }
}
