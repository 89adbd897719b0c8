//! Configuration Module
//!
//! Startup settings from the environment and the persisted engine list.

pub mod preferences;
pub mod settings;

pub use preferences::{Preferences, PreferencesStore};
pub use settings::{AppConfig, DEFAULT_ENGINE};
