pub mod load;
pub mod manager;
pub mod settings;
pub mod user;

pub use load::{
    PROJECT_CONFIG_FILE, SettingsEvent, SettingsEventKind, SettingsLoadOutcome, load_settings,
};
pub use manager::SettingsManager;
pub use settings::{
    EngineSettings, PatchConfig, PatchSettings, StreamConfig, StreamSettings, ZonediffSettings,
};
pub use user::{UserConfigError, UserConfigResult, load_user_config, user_config_path};

/// Programmed defaults, the lowest-precedence layer.
pub fn default_settings() -> ZonediffSettings {
    let defaults = EngineSettings::default();
    ZonediffSettings {
        patch: Some(PatchConfig {
            max_retries: Some(defaults.patch.max_retries),
            min_search_chars: Some(defaults.patch.min_search_chars),
            whitespace_fallback: Some(defaults.patch.whitespace_fallback),
        }),
        stream: Some(StreamConfig {
            strip_code_fences: Some(defaults.stream.strip_code_fences),
        }),
    }
}

/// Merge multiple layers in order.
/// Later configs in the slice have higher precedence (override earlier ones).
/// Use this for layered config: `merge_all(&[defaults, user, project])`
pub fn merge_all(configs: &[Option<ZonediffSettings>]) -> Option<ZonediffSettings> {
    configs.iter().cloned().reduce(merge_settings).flatten()
}

/// Merge two layers, preferring values from `primary` over `fallback`.
pub fn merge_settings(
    fallback: Option<ZonediffSettings>,
    primary: Option<ZonediffSettings>,
) -> Option<ZonediffSettings> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) | (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(ZonediffSettings {
            patch: merge_patch(fallback.patch, primary.patch),
            stream: merge_stream(fallback.stream, primary.stream),
        }),
    }
}

fn merge_patch(fallback: Option<PatchConfig>, primary: Option<PatchConfig>) -> Option<PatchConfig> {
    match (fallback, primary) {
        (Some(fallback), Some(primary)) => Some(PatchConfig {
            max_retries: primary.max_retries.or(fallback.max_retries),
            min_search_chars: primary.min_search_chars.or(fallback.min_search_chars),
            whitespace_fallback: primary.whitespace_fallback.or(fallback.whitespace_fallback),
        }),
        (fallback, primary) => primary.or(fallback),
    }
}

fn merge_stream(
    fallback: Option<StreamConfig>,
    primary: Option<StreamConfig>,
) -> Option<StreamConfig> {
    match (fallback, primary) {
        (Some(fallback), Some(primary)) => Some(StreamConfig {
            strip_code_fences: primary.strip_code_fences.or(fallback.strip_code_fences),
        }),
        (fallback, primary) => primary.or(fallback),
    }
}
