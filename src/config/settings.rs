use serde::{Deserialize, Serialize};

/// `[patch]` table as written in a TOML file. Every field is optional so a
/// layer only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    pub max_retries: Option<u32>,
    pub min_search_chars: Option<usize>,
    pub whitespace_fallback: Option<bool>,
}

/// `[stream]` table as written in a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub strip_code_fences: Option<bool>,
}

/// One configuration layer (defaults, user file or project file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZonediffSettings {
    pub patch: Option<PatchConfig>,
    pub stream: Option<StreamConfig>,
}

/// Resolved structured-patch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchSettings {
    /// Attempts allowed after the first failed one.
    pub max_retries: u32,
    /// Trimmed length a streaming ORIGINAL needs before it is looked up early.
    pub min_search_chars: usize,
    /// Retry a failed lookup with horizontal whitespace stripped.
    pub whitespace_fallback: bool,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_search_chars: 20,
            whitespace_fallback: true,
        }
    }
}

/// Resolved streaming-rewrite settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSettings {
    /// Remove a surrounding markdown fence from completed rewrites.
    pub strip_code_fences: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            strip_code_fences: true,
        }
    }
}

/// Settings the engine and drivers read at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineSettings {
    pub patch: PatchSettings,
    pub stream: StreamSettings,
}

impl From<&ZonediffSettings> for EngineSettings {
    fn from(settings: &ZonediffSettings) -> Self {
        let fallback = EngineSettings::default();
        let patch = settings.patch.clone().unwrap_or_default();
        let stream = settings.stream.clone().unwrap_or_default();
        Self {
            patch: PatchSettings {
                max_retries: patch.max_retries.unwrap_or(fallback.patch.max_retries),
                min_search_chars: patch
                    .min_search_chars
                    .unwrap_or(fallback.patch.min_search_chars),
                whitespace_fallback: patch
                    .whitespace_fallback
                    .unwrap_or(fallback.patch.whitespace_fallback),
            },
            stream: StreamSettings {
                strip_code_fences: stream
                    .strip_code_fences
                    .unwrap_or(fallback.stream.strip_code_fences),
            },
        }
    }
}

impl From<ZonediffSettings> for EngineSettings {
    fn from(settings: ZonediffSettings) -> Self {
        EngineSettings::from(&settings)
    }
}
