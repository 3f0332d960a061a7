//! Error types for the navigation engine.

use crate::browser::BrowserError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No browsing context contains the marker; callers continue in the top document.
    #[error("no browsing context contains marker {marker:?}")]
    ContextNotFound { marker: String },
    #[error("no strategy located room {room:?} for facility {facility:?}")]
    LocatorNotFound { facility: String, room: String },
    #[error("timed out after {waited:?} waiting for {what}")]
    NavigationTimeout { what: String, waited: Duration },
    #[error("attempt produced no records ({targets_failed} of {targets} targets failed)")]
    EmptyResultSuspected { targets: usize, targets_failed: usize },
    #[error("every one of {targets} targets failed")]
    SiteStructureExhausted { targets: usize },
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("failed to launch browser session")]
    Launch(#[source] anyhow::Error),
}
