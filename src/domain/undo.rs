use crate::domain::models::Alarm;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Copy,
    Delete,
    Restore,
}

impl ActionKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::Copy => "Copied alarm.",
            Self::Delete => "Deleted alarm.",
            Self::Restore => "Restored alarm.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndoRecord {
    pub alarm: Alarm,
    pub position: usize,
    pub kind: ActionKind,
}

/// Holds the last reversible action. Setting a new one discards the old.
#[derive(Debug, Default)]
pub struct UndoSlot {
    record: Option<UndoRecord>,
}

impl UndoSlot {
    pub fn set(&mut self, alarm: Alarm, position: usize, kind: ActionKind) {
        self.record = Some(UndoRecord {
            alarm,
            position,
            kind,
        });
    }

    pub fn consume(&mut self) -> Option<UndoRecord> {
        self.record.take()
    }

    pub fn peek(&self) -> Option<&UndoRecord> {
        self.record.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::tests::sample_alarm;

    #[test]
    fn consume_empties_the_slot() {
        let mut slot = UndoSlot::default();
        assert!(slot.consume().is_none());

        slot.set(sample_alarm(1), 0, ActionKind::Delete);
        let record = slot.consume().expect("record present");
        assert_eq!(record.kind, ActionKind::Delete);
        assert_eq!(record.alarm.id, 1);
        assert!(slot.consume().is_none());
    }

    #[test]
    fn set_overwrites_pending_record() {
        let mut slot = UndoSlot::default();
        slot.set(sample_alarm(1), 0, ActionKind::Delete);
        slot.set(sample_alarm(8), 3, ActionKind::Copy);

        assert_eq!(
            slot.consume(),
            Some(UndoRecord {
                alarm: sample_alarm(8),
                position: 3,
                kind: ActionKind::Copy,
            })
        );
        assert!(slot.peek().is_none());
    }
}
