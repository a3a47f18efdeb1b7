pub mod settings;

use std::sync::{Arc, RwLock};

pub use settings::{clamp_word_limit, PublisherKind, Settings, WordPressSettings};

/// Settings shared between the API, the scheduler and the orchestrator.
/// Reloadable at runtime via `/admin/reload-settings`.
pub type SettingsHandle = Arc<RwLock<Settings>>;

pub fn handle(settings: Settings) -> SettingsHandle {
    Arc::new(RwLock::new(settings))
}

/// Clone of the current settings; a poisoned lock still yields the last value.
pub fn snapshot(h: &SettingsHandle) -> Settings {
    match h.read() {
        Ok(g) => g.clone(),
        Err(poison) => poison.into_inner().clone(),
    }
}
