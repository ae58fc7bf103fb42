//! Tracked regions of a document.
//!
//! - `model`: the tagged region record, diffs and stream state
//! - `store`: id-keyed tables with a per-document index
//! - `realign`: the boundary-shifting table applied after every mutation

pub mod model;
pub mod realign;
pub mod store;

pub use model::{
    Diff, DiffId, EditZone, EditorId, PatchBlockMeta, PromptZone, Region, RegionId, RegionKind,
    RequestHandle, StreamState, TrackingZone,
};
pub use realign::{LineEdit, LineSpan, Relationship, classify, realign_span};
pub use store::RegionStore;
