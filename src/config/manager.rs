//! Shared, swappable settings.
//!
//! Drivers read the patch and stream settings on every attempt while the
//! engine may be locked by another task, so the active settings live in an
//! `ArcSwap` instead of behind the engine mutex.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{info, warn};

use super::{EngineSettings, SettingsEventKind, load_settings};

const LOG_TARGET: &str = "zonediff::config";

pub struct SettingsManager {
    root_path: ArcSwap<Option<PathBuf>>,
    settings: ArcSwap<EngineSettings>,
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("root_path", &"ArcSwap<Option<PathBuf>>")
            .field("settings", &"ArcSwap<EngineSettings>")
            .finish()
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl SettingsManager {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            root_path: ArcSwap::new(Arc::new(None)),
            settings: ArcSwap::new(Arc::new(settings)),
        }
    }

    /// Build a manager from the layered config files, logging load events.
    pub fn load(root_path: Option<PathBuf>) -> Self {
        let manager = Self::default();
        manager.set_root_path(root_path);
        manager.reload();
        manager
    }

    /// Re-read the config layers for the current root path.
    pub fn reload(&self) {
        let root = self.root_path();
        let outcome = load_settings(root.as_deref());
        for event in &outcome.events {
            match event.kind {
                SettingsEventKind::Info => info!(target: LOG_TARGET, "{}", event.message),
                SettingsEventKind::Warning => warn!(target: LOG_TARGET, "{}", event.message),
            }
        }
        self.apply_settings(outcome.settings);
    }

    pub fn settings(&self) -> Arc<EngineSettings> {
        self.settings.load_full()
    }

    pub fn apply_settings(&self, settings: EngineSettings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn root_path(&self) -> Option<PathBuf> {
        self.root_path.load().as_ref().clone()
    }

    pub fn set_root_path(&self, path: Option<PathBuf>) {
        self.root_path.store(Arc::new(path));
    }
}
