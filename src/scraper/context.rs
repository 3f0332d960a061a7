//! Browsing-context resolution.
//!
//! The reservation site renders some screens inside a child frame and others
//! directly in the top document, and which one is used changes between
//! releases. Rather than hard-coding frame paths, the resolver probes for a
//! marker text that only appears on the wanted screen.

use crate::browser::{Browser, BrowserError, Frame};
use crate::scraper::errors::EngineError;
use tracing::{debug, trace, warn};

/// The browsing context the engine is currently operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationContext {
    pub frame: Frame,
    /// Page epoch this context was resolved against.
    pub page_epoch: u64,
    /// How many times this context has been (re-)resolved.
    pub resolutions: u32,
}

impl NavigationContext {
    pub fn top(page_epoch: u64) -> Self {
        Self {
            frame: Frame::Top,
            page_epoch,
            resolutions: 0,
        }
    }
}

/// Outcome of a marker probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Found(NavigationContext),
    /// Marker absent everywhere; carries the top-level context to continue in.
    NotFound(NavigationContext),
}

impl Resolved {
    pub fn context(self) -> NavigationContext {
        match self {
            Self::Found(ctx) | Self::NotFound(ctx) => ctx,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

async fn contains_marker(
    browser: &dyn Browser,
    frame: Frame,
    marker: &str,
) -> Result<bool, BrowserError> {
    match browser.page_source(frame).await {
        Ok(source) => Ok(source.contains(marker)),
        // Frames can detach between counting and probing.
        Err(BrowserError::FrameUnavailable(index)) => {
            trace!(frame = index, "frame vanished while probing");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Find the browsing context holding `marker`.
///
/// Probes the current context, then the top document, then each direct child
/// frame of the top document in order. Grandchild frames are not searched.
pub async fn resolve(
    browser: &dyn Browser,
    ctx: NavigationContext,
    marker: &str,
) -> Result<Resolved, BrowserError> {
    let page_epoch = browser.page_epoch().await?;
    let resolutions = ctx.resolutions + 1;
    let at = |frame| NavigationContext {
        frame,
        page_epoch,
        resolutions,
    };

    let mut candidates = vec![ctx.frame];
    if ctx.frame != Frame::Top {
        candidates.push(Frame::Top);
    }
    let frame_count = browser.frame_count().await?;
    candidates.extend(
        (0..frame_count)
            .map(Frame::Nested)
            .filter(|frame| *frame != ctx.frame),
    );

    for frame in candidates {
        if contains_marker(browser, frame, marker).await? {
            debug!(?frame, marker, resolutions, "Resolved browsing context");
            return Ok(Resolved::Found(at(frame)));
        }
    }

    let error = EngineError::ContextNotFound {
        marker: marker.to_string(),
    };
    warn!(error = %error, frame_count, "Continuing in top-level document");
    Ok(Resolved::NotFound(at(Frame::Top)))
}

/// Re-resolve `ctx` only if the page has navigated since it was resolved.
pub async fn ensure(
    browser: &dyn Browser,
    ctx: NavigationContext,
    marker: &str,
) -> Result<NavigationContext, BrowserError> {
    if browser.page_epoch().await? == ctx.page_epoch {
        return Ok(ctx);
    }
    trace!(marker, "Page changed, re-resolving context");
    Ok(resolve(browser, ctx, marker).await?.context())
}
