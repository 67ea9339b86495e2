use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const UNDO_ACTION_LABEL: &str = "UNDO";
pub const DISMISS_ACTION_LABEL: &str = "DISMISS";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionEvent {
    ItemInserted { position: usize },
    ItemRemoved { position: usize },
    RangeChanged { first: usize, last: usize },
    ItemMoved { from: usize, to: usize },
    CollectionReplaced,
    ScrollTo { position: usize },
}

/// A message for the user. `action_label` names the button shown next to it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserNotice {
    pub message: String,
    pub action_label: String,
}

impl UserNotice {
    pub fn undo(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action_label: UNDO_ACTION_LABEL.to_string(),
        }
    }

    pub fn dismissible(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action_label: DISMISS_ACTION_LABEL.to_string(),
        }
    }

    pub fn is_undo(&self) -> bool {
        self.action_label == UNDO_ACTION_LABEL
    }
}

pub trait CollectionObserver: Send + Sync {
    fn on_event(&self, event: CollectionEvent);
    fn on_notice(&self, notice: UserNotice);
}

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<PendingOutput>,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct PendingOutput {
    pub events: VecDeque<CollectionEvent>,
    pub notices: VecDeque<UserNotice>,
}

impl EventQueue {
    pub fn drain(&self) -> PendingOutput {
        self.pending
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl CollectionObserver for EventQueue {
    fn on_event(&self, event: CollectionEvent) {
        if let Ok(mut guard) = self.pending.lock() {
            guard.events.push_back(event);
        }
    }

    fn on_notice(&self, notice: UserNotice) {
        if let Ok(mut guard) = self.pending.lock() {
            guard.notices.push_back(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_pending_output_in_order_and_empties_queue() {
        let queue = EventQueue::default();
        queue.on_event(CollectionEvent::ItemInserted { position: 0 });
        queue.on_notice(UserNotice::undo("Copied alarm."));
        queue.on_event(CollectionEvent::ScrollTo { position: 0 });

        let output = queue.drain();
        assert_eq!(
            Vec::from(output.events),
            vec![
                CollectionEvent::ItemInserted { position: 0 },
                CollectionEvent::ScrollTo { position: 0 },
            ]
        );
        assert!(output.notices[0].is_undo());
        assert_eq!(queue.drain(), PendingOutput::default());
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let json = serde_json::to_value(CollectionEvent::RangeChanged { first: 1, last: 4 })
            .expect("serialize event");
        assert_eq!(
            json,
            serde_json::json!({ "type": "range_changed", "first": 1, "last": 4 })
        );
    }
}
