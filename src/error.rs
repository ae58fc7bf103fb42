//! Error handling types for zonediff
//!
//! This module provides the error type shared by the region store, the
//! structured-patch applier, the streaming writer and the async drivers.

use std::sync::PoisonError;
use thiserror::Error;

use crate::region::{DiffId, RegionId};

/// Comprehensive error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// The ORIGINAL text of a structured-patch block does not occur in the file
    #[error(
        "The ORIGINAL code could not be found in the file. The text in ORIGINAL must be identical to lines in the file:\n{search}"
    )]
    NotFound { search: String },

    /// The ORIGINAL text occurs more than once in the file
    #[error(
        "The ORIGINAL code matched more than one location in the file. Include more surrounding lines so it is unique:\n{search}"
    )]
    NotUnique { search: String },

    /// The ORIGINAL text overlaps an earlier block of the same patch
    #[error(
        "The ORIGINAL code overlaps with a previous block. Blocks must not overlap:\n{search}"
    )]
    HasOverlap { search: String },

    /// No complete search/replace block was found in the patch text
    #[error("No search/replace blocks were found")]
    NoBlocksFound,

    /// Internal invariant violation
    #[error("Invalid region state: {message}")]
    InvalidRegionState { message: String },

    /// Region id is not live
    #[error("Region not found: {0}")]
    RegionNotFound(RegionId),

    /// Diff id is not live
    #[error("Diff not found: {0}")]
    DiffNotFound(DiffId),

    /// Document has not been opened in the engine
    #[error("Document not found: {uri}")]
    DocumentNotFound { uri: String },

    /// A new region would overlap an existing one
    #[error("Lines {start_line}-{end_line} overlap existing region {existing}")]
    RegionOverlap {
        start_line: usize,
        end_line: usize,
        existing: RegionId,
    },

    /// A stream is already running on the document
    #[error("A stream is already active on {uri}")]
    StreamAlreadyActive { uri: String },

    /// The region is not streaming
    #[error("Region {0} is not streaming")]
    StreamNotActive(RegionId),

    /// The stream was aborted (control flow, not a failure)
    #[error("Stream aborted")]
    StreamAborted,

    /// The LLM transport failed
    #[error("{provider} request failed after {attempts} attempt(s): {message}")]
    Transport {
        provider: String,
        attempts: u32,
        message: String,
    },

    /// The patch stream kept failing after the configured number of attempts
    #[error("Giving up after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Helper trait to convert PoisonError into a usable guard
pub trait LockResultExt<T> {
    /// Recover from a poisoned lock, logging which operation hit it.
    fn recover_poison(self, context: &str) -> Result<T, EngineError>;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> Result<T, EngineError> {
        match self {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                log::warn!(
                    target: "zonediff::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                Ok(poisoned.into_inner())
            }
        }
    }
}

/// Helper functions for common error patterns
impl EngineError {
    pub fn not_found(search: impl Into<String>) -> Self {
        EngineError::NotFound {
            search: search.into(),
        }
    }

    pub fn not_unique(search: impl Into<String>) -> Self {
        EngineError::NotUnique {
            search: search.into(),
        }
    }

    pub fn has_overlap(search: impl Into<String>) -> Self {
        EngineError::HasOverlap {
            search: search.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        EngineError::InvalidRegionState {
            message: message.into(),
        }
    }

    pub fn document_not_found(uri: impl Into<String>) -> Self {
        EngineError::DocumentNotFound { uri: uri.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config {
            message: message.into(),
        }
    }

    /// Whether this is a block-location failure that a corrected prompt can fix.
    pub fn is_location_failure(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::NotUnique { .. }
                | EngineError::HasOverlap { .. }
        )
    }
}
