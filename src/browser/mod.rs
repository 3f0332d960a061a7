//! Browser automation seam.
//!
//! The engine never talks to a driver directly; it goes through [`Browser`],
//! which exposes exactly the DOM operations the navigation heuristics need.
//! Every call names the browsing context ([`Frame`]) it operates in, so frame
//! switching is explicit data instead of hidden driver state.

pub mod chrome;

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::trace;

/// A browsing context: the top-level document or one of its direct child frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Frame {
    #[default]
    Top,
    /// Index into `window.frames` of the top-level document.
    Nested(usize),
}

/// Opaque reference to an element found by [`Browser::find`].
///
/// Handles go stale when the document they were found in navigates away;
/// drivers report that as [`BrowserError::StaleElement`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub frame: Frame,
    pub id: u64,
}

/// Structural element query, evaluated in document order.
///
/// * `css` selects candidates.
/// * `text_any`, when non-empty, keeps candidates whose text content contains
///   any needle, and then only the innermost of them (an element is dropped
///   when another kept candidate lies inside it).
/// * `after` keeps candidates that follow the anchor in document order and
///   are not inside it.
/// * `within` keeps candidates inside the scope element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub css: String,
    pub text_any: Vec<String>,
    pub after: Option<ElementHandle>,
    pub within: Option<ElementHandle>,
}

impl Query {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text_any: Vec::new(),
            after: None,
            within: None,
        }
    }

    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.text_any.push(needle.into());
        self
    }

    pub fn containing_any<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_any.extend(needles.into_iter().map(Into::into));
        self
    }

    pub fn after(mut self, anchor: &ElementHandle) -> Self {
        self.after = Some(anchor.clone());
        self
    }

    pub fn within(mut self, scope: &ElementHandle) -> Self {
        self.within = Some(scope.clone());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("element handle {0} is stale")]
    StaleElement(u64),
    #[error("frame {0} is not available")]
    FrameUnavailable(usize),
    #[error("browser session already closed")]
    Closed,
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// DOM operations required by the navigation engine.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Changes whenever the top-level document is replaced.
    async fn page_epoch(&self) -> Result<u64, BrowserError>;

    /// Number of direct child frames of the top-level document.
    async fn frame_count(&self) -> Result<usize, BrowserError>;

    /// Serialized HTML of the given context.
    async fn page_source(&self, frame: Frame) -> Result<String, BrowserError>;

    async fn find(&self, frame: Frame, query: &Query) -> Result<Vec<ElementHandle>, BrowserError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, BrowserError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    /// Scroll the element into view and activate it.
    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    /// Replace an input's value and submit its form.
    async fn submit_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError>;

    /// Tear the session down. Later calls fail with [`BrowserError::Closed`].
    async fn close(&self);
}

/// Allocates a fresh, exclusively owned browser session per attempt.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: Browser + 'static;

    async fn launch(&self) -> anyhow::Result<Self::Session>;
}

/// First candidate of `query` that is rendered visible.
pub async fn first_visible(
    browser: &dyn Browser,
    frame: Frame,
    query: &Query,
) -> Result<Option<ElementHandle>, BrowserError> {
    for candidate in browser.find(frame, query).await? {
        if browser.is_visible(&candidate).await? {
            return Ok(Some(candidate));
        }
        trace!(css = query.css.as_str(), id = candidate.id, "candidate not visible");
    }
    Ok(None)
}

/// Every candidate of `query` that is rendered visible, in document order.
pub async fn all_visible(
    browser: &dyn Browser,
    frame: Frame,
    query: &Query,
) -> Result<Vec<ElementHandle>, BrowserError> {
    let mut visible = Vec::new();
    for candidate in browser.find(frame, query).await? {
        if browser.is_visible(&candidate).await? {
            visible.push(candidate);
        }
    }
    Ok(visible)
}

/// Poll until `query` matches at least one element, or give up after `timeout`.
///
/// Returns `Ok(None)` on timeout so callers can choose the error to raise.
pub async fn wait_for(
    browser: &dyn Browser,
    frame: Frame,
    query: &Query,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<Vec<ElementHandle>>, BrowserError> {
    let start = Instant::now();
    loop {
        let found = browser.find(frame, query).await?;
        if !found.is_empty() {
            return Ok(Some(found));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        tokio::time::sleep(poll.min(timeout)).await;
    }
}
