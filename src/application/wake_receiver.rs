use crate::domain::models::{Alarm, AlarmDefaults, AlarmId};
use crate::infrastructure::alarm_repository::AlarmStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::wake_scheduler::WakeScheduler;
use chrono::NaiveTime;
use tracing::{info, warn};

/// Handles a wake entry that just fired. The store is the source of truth:
/// an entry whose alarm is gone or disabled does not ring.
pub fn resolve_fired_wake<S, W>(
    store: &S,
    scheduler: &W,
    alarm_id: AlarmId,
) -> Result<Option<Alarm>, InfraError>
where
    S: AlarmStore + ?Sized,
    W: WakeScheduler + ?Sized,
{
    let Some(alarm) = store.find(alarm_id)? else {
        warn!(alarm_id, "wake fired for an alarm that no longer exists");
        // Cancellation only looks at the id.
        let stale = Alarm::from_defaults(alarm_id, NaiveTime::MIN, &AlarmDefaults::default());
        scheduler.cancel(&stale)?;
        return Ok(None);
    };

    if !alarm.enabled {
        warn!(alarm_id, "wake fired for a disabled alarm");
        scheduler.cancel(&alarm)?;
        return Ok(None);
    }

    if alarm.repeat {
        scheduler.schedule(&alarm)?;
    }
    info!(alarm_id, repeat = alarm.repeat, "alarm ringing");
    Ok(Some(alarm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::tests::sample_alarm;
    use crate::domain::models::DayMask;
    use crate::infrastructure::alarm_repository::InMemoryAlarmStore;
    use crate::infrastructure::wake_scheduler::{InMemoryWakeScheduler, NowProvider};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::{Arc, Mutex};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, day)
            .expect("valid date")
            .and_hms_opt(hour, minute, 0)
            .expect("valid time")
    }

    fn movable_clock(start: NaiveDateTime) -> (Arc<Mutex<NaiveDateTime>>, NowProvider) {
        let clock = Arc::new(Mutex::new(start));
        let reader = Arc::clone(&clock);
        (
            clock,
            Arc::new(move || *reader.lock().expect("clock lock")),
        )
    }

    #[test]
    fn deleted_alarm_does_not_ring_and_entry_is_cleared() {
        let store = InMemoryAlarmStore::default();
        let scheduler = InMemoryWakeScheduler::default();
        scheduler.schedule(&sample_alarm(8)).expect("schedule");

        let fired = resolve_fired_wake(&store, &scheduler, 8).expect("resolve");
        assert_eq!(fired, None);
        assert_eq!(scheduler.entry(8).expect("entry"), None);
    }

    #[test]
    fn disabled_alarm_does_not_ring() {
        let mut alarm = sample_alarm(1);
        alarm.enabled = false;
        let store = InMemoryAlarmStore::with_alarms(vec![alarm]);
        let scheduler = InMemoryWakeScheduler::default();

        assert_eq!(resolve_fired_wake(&store, &scheduler, 1).expect("resolve"), None);
    }

    #[test]
    fn repeating_alarm_is_rescheduled_for_next_day() {
        let mut alarm = sample_alarm(1);
        alarm.repeat = true;
        alarm.days = DayMask::WEEKDAYS;
        let store = InMemoryAlarmStore::with_alarms(vec![alarm.clone()]);
        // 2026-02-20 is a Friday; the wake fired at 07:30 and is handled a minute later.
        let (_clock, now) = movable_clock(at(20, 7, 31));
        let scheduler = InMemoryWakeScheduler::new(now);

        let fired = resolve_fired_wake(&store, &scheduler, 1).expect("resolve");
        assert_eq!(fired, Some(alarm));
        assert_eq!(
            scheduler.entry(1).expect("entry").map(|wake| wake.fire_at),
            Some(at(23, 7, 30))
        );
    }

    #[test]
    fn one_shot_alarm_rings_without_rescheduling() {
        let store = InMemoryAlarmStore::with_alarms(vec![sample_alarm(1)]);
        let (clock, now) = movable_clock(at(16, 6, 0));
        let scheduler = InMemoryWakeScheduler::new(now);
        scheduler.schedule(&sample_alarm(1)).expect("schedule");
        *clock.lock().expect("clock lock") = at(16, 7, 31);

        let fired = resolve_fired_wake(&store, &scheduler, 1).expect("resolve");
        assert_eq!(fired.map(|alarm| alarm.id), Some(1));
        assert_eq!(
            scheduler.entry(1).expect("entry").map(|wake| wake.fire_at),
            Some(at(16, 7, 30))
        );
    }
}
