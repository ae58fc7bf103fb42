pub mod config;
pub mod diff;
pub mod driver;
pub mod engine;
pub mod error;
pub mod llm;
pub mod patch;
pub mod prompts;
pub mod region;
pub mod text;

pub use config::{EngineSettings, SettingsManager};
pub use diff::{DiffKind, LineDiff, diff_lines};
pub use driver::{PromptOptions, SharedEngine};
pub use engine::{AcceptRejectBehavior, Engine, EngineEvent, PatchProgress};
pub use error::{EngineError, EngineResult};
pub use llm::{LlmStream, LlmTransport, StreamEvent};
pub use region::{Diff, DiffId, EditorId, Region, RegionId, RegionKind, RequestHandle};
pub use text::{MemoryBuffer, Position, TextBuffer, TextRange};
