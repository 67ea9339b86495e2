pub mod alarm_repository;
pub mod config;
pub mod error;
pub mod logging;
pub mod wake_scheduler;
