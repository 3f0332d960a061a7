//! Facility and room locating.
//!
//! Search results list facilities as collapsed blocks; each block hides a
//! room list behind an expander, and each room row carries an action control
//! that opens its availability calendar. The markup around these pieces is
//! not stable, so locating is expressed as an ordered list of
//! [`LocateStrategy`] implementations tried until one succeeds.

use crate::browser::{Browser, BrowserError, ElementHandle, Query, all_visible, first_visible};
use crate::scraper::context::NavigationContext;
use crate::scraper::errors::EngineError;
use async_trait::async_trait;
use tracing::{debug, trace};
use url::Url;

/// Structural selectors for the control that reveals a facility's room list.
const EXPANDER_CSS: &str = "button.expand-icon, .expand-icon, i.fa-caret-right, \
     span.icon-caret-right, button[aria-expanded='false'], a.toggle-rooms";

/// Label text of expanders that are plain buttons or links.
const EXPANDER_LABELS: &[&str] = &["部屋一覧", "室場一覧", "部屋を表示", "室場を表示", "▼", "▶", "Rooms"];

/// Elements that may represent one room entry.
const ROW_CSS: &str = "tr, li, div";

const ACTION_CSS: &str = "a, button, input[type='button'], input[type='submit']";

const ACTION_LABELS: &[&str] = &[
    "空き状況", "空状況", "予約", "確認", "カレンダー", "check", "Check", "reserve", "Reserve",
];

/// Room actions recognisable by structure alone.
const ACTION_FALLBACK_CSS: &str = "a.room-link, td.room-name a";

/// How the calendar for a located room is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    /// Absolute URL to load directly.
    Url(String),
    /// Control to click in the context it was found in.
    Element(ElementHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub facility_label: String,
    pub room_label: String,
    pub action: TargetAction,
}

/// One way of turning (facility seed, room keyword) into an action control.
#[async_trait]
pub trait LocateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn locate(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        facility: &str,
        room: &str,
    ) -> Result<Option<ElementHandle>, BrowserError>;
}

/// First visible action control inside `row`, else the first one after it.
async fn action_for_row(
    browser: &dyn Browser,
    ctx: NavigationContext,
    row: &ElementHandle,
) -> Result<Option<ElementHandle>, BrowserError> {
    let labelled = Query::css(ACTION_CSS).containing_any(ACTION_LABELS.iter().copied());
    let structural = Query::css(ACTION_FALLBACK_CSS);

    for query in [
        labelled.clone().within(row),
        structural.clone().within(row),
        labelled.after(row),
        structural.after(row),
    ] {
        if let Some(action) = first_visible(browser, ctx.frame, &query).await? {
            return Ok(Some(action));
        }
    }
    Ok(None)
}

async fn room_row_after(
    browser: &dyn Browser,
    ctx: NavigationContext,
    anchor: &ElementHandle,
    room: &str,
) -> Result<Option<ElementHandle>, BrowserError> {
    let query = Query::css(ROW_CSS).containing(room).after(anchor);
    first_visible(browser, ctx.frame, &query).await
}

/// Facility-scoped search: expander, room row and action must all follow the facility label.
pub struct AnchoredStrategy;

impl AnchoredStrategy {
    async fn expander_after(
        browser: &dyn Browser,
        ctx: NavigationContext,
        anchor: &ElementHandle,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        let structural = Query::css(EXPANDER_CSS).after(anchor);
        if let Some(found) = first_visible(browser, ctx.frame, &structural).await? {
            return Ok(Some(found));
        }
        let labelled = Query::css("button, a")
            .containing_any(EXPANDER_LABELS.iter().copied())
            .after(anchor);
        first_visible(browser, ctx.frame, &labelled).await
    }
}

#[async_trait]
impl LocateStrategy for AnchoredStrategy {
    fn name(&self) -> &'static str {
        "anchored"
    }

    async fn locate(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        facility: &str,
        room: &str,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        if facility.is_empty() {
            return Ok(None);
        }

        let anchors =
            all_visible(browser, ctx.frame, &Query::css("body *").containing(facility)).await?;
        trace!(facility, anchors = anchors.len(), "Facility anchors");

        for anchor in &anchors {
            let Some(expander) = Self::expander_after(browser, ctx, anchor).await? else {
                continue;
            };
            browser.click(&expander).await?;

            let mut row = room_row_after(browser, ctx, &expander, room).await?;
            if row.is_none() {
                // Some lists toggle on the first click after a re-render.
                browser.click(&expander).await?;
                row = room_row_after(browser, ctx, &expander, room).await?;
            }
            let Some(row) = row else {
                trace!(facility, room, "No visible room row after expander");
                continue;
            };

            if let Some(action) = action_for_row(browser, ctx, &row).await? {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }
}

/// Document-wide search for the room keyword after expanding every facility,
/// ignoring which facility the row belongs to.
pub struct GlobalStrategy;

#[async_trait]
impl LocateStrategy for GlobalStrategy {
    fn name(&self) -> &'static str {
        "global"
    }

    async fn locate(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        _facility: &str,
        room: &str,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        // Open every collapsed room list first; hidden rows never match.
        for expander in all_visible(browser, ctx.frame, &Query::css(EXPANDER_CSS)).await? {
            browser.click(&expander).await?;
        }

        let query = Query::css(ROW_CSS).containing(room);
        let Some(row) = first_visible(browser, ctx.frame, &query).await? else {
            return Ok(None);
        };
        action_for_row(browser, ctx, &row).await
    }
}

/// Ordered strategy list; the first strategy to produce an action wins.
pub struct Locator {
    strategies: Vec<Box<dyn LocateStrategy>>,
}

impl Locator {
    pub fn new(strategies: Vec<Box<dyn LocateStrategy>>) -> Self {
        Self { strategies }
    }

    /// The global fallback cannot tell facilities apart, so it is only
    /// included when the caller does not filter by facility.
    pub fn for_query(requires_facility: bool) -> Self {
        let mut strategies: Vec<Box<dyn LocateStrategy>> = vec![Box::new(AnchoredStrategy)];
        if !requires_facility {
            strategies.push(Box::new(GlobalStrategy));
        }
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn locate(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        facility: &str,
        room: &str,
    ) -> Result<TargetDescriptor, EngineError> {
        for strategy in &self.strategies {
            let Some(control) = strategy.locate(browser, ctx, facility, room).await? else {
                trace!(strategy = strategy.name(), facility, room, "Strategy found nothing");
                continue;
            };
            let action = to_action(browser, control).await?;
            debug!(strategy = strategy.name(), facility, room, ?action, "Located room");
            return Ok(TargetDescriptor {
                facility_label: facility.to_string(),
                room_label: room.to_string(),
                action,
            });
        }
        Err(EngineError::LocatorNotFound {
            facility: facility.to_string(),
            room: room.to_string(),
        })
    }
}

/// Resolve an `href` against the current page, ignoring script and fragment-only links.
pub fn href_target(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:")
    {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(String::from)
}

async fn to_action(
    browser: &dyn Browser,
    control: ElementHandle,
) -> Result<TargetAction, BrowserError> {
    let Some(href) = browser.attribute(&control, "href").await? else {
        return Ok(TargetAction::Element(control));
    };
    let base = browser.current_url().await?;
    Ok(match href_target(&base, &href) {
        Some(url) => TargetAction::Url(url),
        None => TargetAction::Element(control),
    })
}
