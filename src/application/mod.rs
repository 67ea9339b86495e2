pub mod alarm_collection;
pub mod bootstrap;
pub mod change_notifier;
pub mod commands;
pub mod events;
pub mod viewport;
pub mod wake_receiver;
