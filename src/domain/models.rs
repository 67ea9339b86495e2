use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub type AlarmId = u32;

/// Largest id the allocator may hand out (ids live in a signed 32-bit column).
pub const MAX_ALARM_ID: AlarmId = i32::MAX as AlarmId;
pub const MAX_VOLUME: u8 = 100;

/// Weekday bitset, one bit per day starting at Sunday = 1.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DayMask(u8);

impl DayMask {
    pub const NONE: Self = Self(0);
    pub const SUNDAY: Self = Self(1);
    pub const MONDAY: Self = Self(2);
    pub const TUESDAY: Self = Self(4);
    pub const WEDNESDAY: Self = Self(8);
    pub const THURSDAY: Self = Self(16);
    pub const FRIDAY: Self = Self(32);
    pub const SATURDAY: Self = Self(64);
    pub const WEEKDAYS: Self = Self(2 | 4 | 8 | 16 | 32);
    pub const WEEKENDS: Self = Self(1 | 64);
    pub const EVERYDAY: Self = Self(127);

    const ORDERED: [Weekday; 7] = [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ];

    /// Unknown high bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::EVERYDAY.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        days.into_iter()
            .fold(Self::NONE, |mask, day| Self(mask.0 | Self::bit(day)))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn toggle(&mut self, day: Weekday) {
        self.0 ^= Self::bit(day);
    }

    pub fn weekdays(self) -> impl Iterator<Item = Weekday> {
        Self::ORDERED
            .into_iter()
            .filter(move |day| self.contains(*day))
    }

    pub fn summary(self) -> String {
        match self {
            Self::EVERYDAY => "Everyday".to_string(),
            Self::WEEKDAYS => "Weekdays".to_string(),
            Self::WEEKENDS => "Weekends".to_string(),
            Self::NONE => "None".to_string(),
            _ => self
                .weekdays()
                .map(short_weekday_name)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_sunday()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alarm {
    pub id: AlarmId,
    pub hour: u8,
    pub minute: u8,
    pub repeat: bool,
    pub days: DayMask,
    pub enabled: bool,
    pub name: String,
    pub sound: String,
    pub vibrate: bool,
    pub volume: u8,
    pub use_24_hour_format: bool,
    pub use_nfc: bool,
    pub nfc_tag_id: String,
    pub use_dismiss_early: bool,
    pub dismiss_early_minutes: u32,
}

impl Alarm {
    /// Builds a new enabled alarm at `time` using the configured defaults.
    pub fn from_defaults(id: AlarmId, time: NaiveTime, defaults: &AlarmDefaults) -> Self {
        Self {
            id,
            hour: time.hour_u8(),
            minute: time.minute_u8(),
            repeat: defaults.repeat,
            days: defaults.days,
            enabled: true,
            name: defaults.name.clone(),
            sound: defaults.sound.clone(),
            vibrate: defaults.vibrate,
            volume: defaults.volume,
            use_24_hour_format: defaults.use_24_hour_format,
            use_nfc: defaults.use_nfc,
            nfc_tag_id: String::new(),
            use_dismiss_early: defaults.use_dismiss_early,
            dismiss_early_minutes: defaults.dismiss_early_minutes,
        }
    }

    /// Field-for-field duplicate carrying a different id.
    pub fn duplicate(&self, id: AlarmId) -> Self {
        Self { id, ..self.clone() }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id == 0 || self.id > MAX_ALARM_ID {
            return Err(format!("alarm.id {} is out of range", self.id));
        }
        validate_time(self.hour, self.minute)?;
        validate_volume(self.volume)?;
        Ok(())
    }

    /// Applies a single field edit, returning whether the alarm changed.
    pub fn apply(&mut self, edit: AlarmEdit) -> Result<bool, String> {
        let before = self.clone();
        match edit {
            AlarmEdit::Time { hour, minute } => {
                validate_time(hour, minute)?;
                self.hour = hour;
                self.minute = minute;
            }
            AlarmEdit::Name(name) => self.name = name.trim().to_string(),
            AlarmEdit::Sound(sound) => self.sound = sound,
            AlarmEdit::Volume(volume) => {
                validate_volume(volume)?;
                self.volume = volume;
            }
            AlarmEdit::Enabled(enabled) => self.enabled = enabled,
            AlarmEdit::Repeat(repeat) => self.repeat = repeat,
            AlarmEdit::Days(days) => self.days = days,
            AlarmEdit::ToggleDay(day) => self.days.toggle(day),
            AlarmEdit::Vibrate(vibrate) => self.vibrate = vibrate,
            AlarmEdit::UseNfc(use_nfc) => self.use_nfc = use_nfc,
            AlarmEdit::NfcTagId(tag_id) => self.nfc_tag_id = tag_id.trim().to_string(),
            AlarmEdit::Use24HourFormat(value) => self.use_24_hour_format = value,
            AlarmEdit::DismissEarly { enabled, minutes } => {
                self.use_dismiss_early = enabled;
                self.dismiss_early_minutes = minutes;
            }
        }
        Ok(*self != before)
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// `H:MM`, with the hour converted to 12-hour form unless 24-hour display is on.
    pub fn clock_time(&self) -> String {
        let hour = if self.use_24_hour_format {
            self.hour
        } else {
            to_12_hour(self.hour)
        };
        format!("{hour}:{:02}", self.minute)
    }

    pub fn meridian(&self) -> &'static str {
        if self.use_24_hour_format {
            ""
        } else if self.hour < 12 {
            "AM"
        } else {
            "PM"
        }
    }

    /// Next time this alarm fires strictly from `now` on, or `None` when disabled.
    pub fn next_occurrence(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.enabled {
            return None;
        }
        let today = now.date().and_time(self.time());

        if self.days.is_empty() {
            return Some(if today < now {
                today + Duration::days(1)
            } else {
                today
            });
        }

        (0..=7)
            .map(|offset| today + Duration::days(offset))
            .find(|candidate| *candidate >= now && self.days.contains(candidate.weekday()))
    }
}

/// The alarm among `alarms` that fires soonest after `now`.
pub fn next_alarm<'a>(alarms: &'a [Alarm], now: NaiveDateTime) -> Option<(&'a Alarm, NaiveDateTime)> {
    alarms
        .iter()
        .filter_map(|alarm| alarm.next_occurrence(now).map(|at| (alarm, at)))
        .min_by_key(|(_, at)| *at)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum AlarmEdit {
    Time { hour: u8, minute: u8 },
    Name(String),
    Sound(String),
    Volume(u8),
    Enabled(bool),
    Repeat(bool),
    Days(DayMask),
    ToggleDay(Weekday),
    Vibrate(bool),
    UseNfc(bool),
    NfcTagId(String),
    Use24HourFormat(bool),
    DismissEarly { enabled: bool, minutes: u32 },
}

/// Global alarm preferences seeding every new alarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDefaults {
    pub repeat: bool,
    pub days: DayMask,
    pub vibrate: bool,
    pub use_nfc: bool,
    pub sound: String,
    pub volume: u8,
    pub name: String,
    #[serde(rename = "use24HourFormat")]
    pub use_24_hour_format: bool,
    pub use_dismiss_early: bool,
    pub dismiss_early_minutes: u32,
    pub max_alarms: usize,
}

impl Default for AlarmDefaults {
    fn default() -> Self {
        Self {
            repeat: false,
            days: DayMask::NONE,
            vibrate: false,
            use_nfc: false,
            sound: String::new(),
            volume: 75,
            name: String::new(),
            use_24_hour_format: false,
            use_dismiss_early: false,
            dismiss_early_minutes: 30,
            max_alarms: 50,
        }
    }
}

impl AlarmDefaults {
    pub fn validate(&self) -> Result<(), String> {
        validate_volume(self.volume)?;
        if self.max_alarms == 0 {
            return Err("defaults.max_alarms must be > 0".to_string());
        }
        Ok(())
    }
}

trait TimeParts {
    fn hour_u8(&self) -> u8;
    fn minute_u8(&self) -> u8;
}

impl TimeParts for NaiveTime {
    fn hour_u8(&self) -> u8 {
        chrono::Timelike::hour(self) as u8
    }

    fn minute_u8(&self) -> u8 {
        chrono::Timelike::minute(self) as u8
    }
}

fn validate_time(hour: u8, minute: u8) -> Result<(), String> {
    if hour > 23 {
        return Err(format!("alarm.hour must be < 24, got {hour}"));
    }
    if minute > 59 {
        return Err(format!("alarm.minute must be < 60, got {minute}"));
    }
    Ok(())
}

fn validate_volume(volume: u8) -> Result<(), String> {
    if volume > MAX_VOLUME {
        return Err(format!("alarm.volume must be <= {MAX_VOLUME}, got {volume}"));
    }
    Ok(())
}

fn to_12_hour(hour: u8) -> u8 {
    match hour % 12 {
        0 => 12,
        other => other,
    }
}

fn short_weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    pub(crate) fn sample_alarm(id: AlarmId) -> Alarm {
        Alarm {
            id,
            hour: 7,
            minute: 30,
            repeat: false,
            days: DayMask::NONE,
            enabled: true,
            name: format!("alarm-{id}"),
            sound: "/sounds/ring.mp3".to_string(),
            vibrate: true,
            volume: 80,
            use_24_hour_format: false,
            use_nfc: false,
            nfc_tag_id: String::new(),
            use_dismiss_early: false,
            dismiss_early_minutes: 30,
        }
    }

    // 2026-02-16 is a Monday.
    fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(hour, minute, 0)
            .expect("valid time")
    }

    #[test]
    fn alarm_validate_accepts_sample() {
        assert!(sample_alarm(1).validate().is_ok());
    }

    #[test]
    fn alarm_validate_rejects_zero_id_and_bad_time() {
        assert!(sample_alarm(0).validate().is_err());

        let mut alarm = sample_alarm(1);
        alarm.hour = 24;
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn duplicate_keeps_every_field_but_id() {
        let original = sample_alarm(1);
        let copy = original.duplicate(8);
        assert_eq!(copy.id, 8);
        assert_eq!(Alarm { id: 1, ..copy }, original);
    }

    #[test]
    fn from_defaults_uses_preferences_and_time() {
        let defaults = AlarmDefaults {
            repeat: true,
            days: DayMask::WEEKDAYS,
            vibrate: true,
            name: "Work".to_string(),
            ..AlarmDefaults::default()
        };
        let alarm = Alarm::from_defaults(
            15,
            NaiveTime::from_hms_opt(6, 45, 12).expect("valid time"),
            &defaults,
        );

        assert_eq!((alarm.id, alarm.hour, alarm.minute), (15, 6, 45));
        assert!(alarm.enabled && alarm.repeat && alarm.vibrate);
        assert_eq!(alarm.days, DayMask::WEEKDAYS);
        assert_eq!(alarm.name, "Work");
    }

    #[test]
    fn apply_reports_changes_only_when_fields_differ() {
        let mut alarm = sample_alarm(1);
        assert_eq!(alarm.apply(AlarmEdit::Enabled(true)), Ok(false));
        assert_eq!(alarm.apply(AlarmEdit::Enabled(false)), Ok(true));
        assert_eq!(alarm.apply(AlarmEdit::ToggleDay(Weekday::Wed)), Ok(true));
        assert!(alarm.days.contains(Weekday::Wed));
        assert!(alarm.apply(AlarmEdit::Time { hour: 25, minute: 0 }).is_err());
        assert_eq!((alarm.hour, alarm.minute), (7, 30));
    }

    #[test]
    fn day_mask_summary() {
        assert_eq!(DayMask::WEEKDAYS.summary(), "Weekdays");
        assert_eq!(DayMask::WEEKENDS.summary(), "Weekends");
        assert_eq!(DayMask::EVERYDAY.summary(), "Everyday");
        assert_eq!(
            DayMask::from_weekdays([Weekday::Wed, Weekday::Mon]).summary(),
            "Mon, Wed"
        );
    }

    #[test]
    fn clock_time_follows_display_format() {
        let mut alarm = sample_alarm(1);
        alarm.hour = 0;
        alarm.minute = 5;
        assert_eq!((alarm.clock_time().as_str(), alarm.meridian()), ("12:05", "AM"));

        alarm.hour = 17;
        assert_eq!((alarm.clock_time().as_str(), alarm.meridian()), ("5:05", "PM"));

        alarm.use_24_hour_format = true;
        assert_eq!((alarm.clock_time().as_str(), alarm.meridian()), ("17:05", ""));
    }

    #[test]
    fn one_time_alarm_rolls_to_tomorrow_when_past() {
        let alarm = sample_alarm(1);
        assert_eq!(alarm.next_occurrence(monday_at(6, 0)), Some(monday_at(7, 30)));
        assert_eq!(
            alarm.next_occurrence(monday_at(8, 0)),
            Some(monday_at(7, 30) + Duration::days(1))
        );
    }

    #[test]
    fn day_alarm_picks_next_selected_weekday() {
        let mut alarm = sample_alarm(1);
        alarm.repeat = true;
        alarm.days = DayMask::from_weekdays([Weekday::Mon, Weekday::Thu]);

        assert_eq!(alarm.next_occurrence(monday_at(7, 0)), Some(monday_at(7, 30)));
        assert_eq!(
            alarm.next_occurrence(monday_at(9, 0)),
            Some(monday_at(7, 30) + Duration::days(3))
        );
    }

    #[test]
    fn disabled_alarm_never_occurs() {
        let mut alarm = sample_alarm(1);
        alarm.enabled = false;
        assert_eq!(alarm.next_occurrence(monday_at(6, 0)), None);
    }

    #[test]
    fn next_alarm_picks_soonest_enabled() {
        let mut early = sample_alarm(1);
        early.hour = 6;
        early.enabled = false;
        let mut late = sample_alarm(8);
        late.hour = 9;
        let middle = sample_alarm(15);

        let alarms = vec![early, late, middle];
        let (alarm, at) = next_alarm(&alarms, monday_at(5, 0)).expect("an enabled alarm");
        assert_eq!(alarm.id, 15);
        assert_eq!(at, monday_at(7, 30));
    }

    proptest! {
        #[test]
        fn next_occurrence_is_never_in_the_past(
            bits in 0u8..128u8,
            hour in 0u8..24u8,
            minute in 0u8..60u8,
            now_hour in 0u32..24u32,
            now_minute in 0u32..60u32
        ) {
            let mut alarm = sample_alarm(1);
            alarm.days = DayMask::from_bits(bits);
            alarm.hour = hour;
            alarm.minute = minute;
            let now = monday_at(now_hour, now_minute);

            let next = alarm.next_occurrence(now).expect("enabled alarm occurs");
            prop_assert!(next >= now);
            prop_assert!(next - now <= Duration::days(7));
            prop_assert_eq!((next.time().hour_u8(), next.time().minute_u8()), (hour, minute));
            if !alarm.days.is_empty() {
                prop_assert!(alarm.days.contains(next.weekday()));
            }
        }
    }

    #[test]
    fn alarm_supports_serde_roundtrip() {
        let alarm = sample_alarm(22);
        let roundtrip: Alarm =
            serde_json::from_str(&serde_json::to_string(&alarm).expect("serialize alarm"))
                .expect("deserialize alarm");
        assert_eq!(roundtrip, alarm);
    }
}
