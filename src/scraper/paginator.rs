//! Calendar pagination.
//!
//! Detail pages come in two shapes. Most show a week (or month) of time
//! slots with a "next" control; this is [`PaginationMode::Linear`]. Some show
//! a month-grid calendar where each day must be clicked to reveal its slots;
//! this is [`PaginationMode::Grid`], and only weekend and holiday days are
//! visited.

use crate::browser::{Browser, BrowserError, ElementHandle, Query};
use crate::scraper::context::{self, NavigationContext};
use crate::scraper::errors::EngineError;
use crate::scraper::table::{self, clean_text, direct_rows, row_cells};
use html_scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").unwrap());

const NEXT_CSS: &str = "button.next, a.next-week, button.next-week, a.next-month, \
     button.next-month, a.next, i.fa-chevron-right";

const NEXT_LABEL_CSS: &str = "a, button, input[type='button'], span";

const NEXT_LABELS: &[&str] = &["次へ", "次週", "翌週", "翌月", "次月", "Next", "next", "＞", "≫"];

const REST_DAY_HEADERS: &[&str] = &["土", "日", "祝", "sat", "sun"];

const REST_DAY_CLASSES: &[&str] = &["sat", "sun", "holiday"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    Linear,
    Grid,
}

/// Why a walk ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxSteps,
    NoNextControl,
    /// A planned grid cell could no longer be found on the page.
    NoMoreCells,
}

/// One captured view of the calendar.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub html: String,
    pub step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWalk {
    pub mode: PaginationMode,
    pub steps: usize,
    pub stop: StopReason,
}

/// Month-grid cells to visit, as (row, column) over the grid's own rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPlan {
    pub cells: Vec<(usize, usize)>,
}

fn has_month_grid(snapshot_html: &str) -> bool {
    Html::parse_document(snapshot_html)
        .select(&TABLE_SEL)
        .any(table::is_month_grid)
}

/// Grid when the page shows a month calendar but no schedule table yet.
pub fn detect_mode(snapshot_html: &str) -> PaginationMode {
    if has_month_grid(snapshot_html) && table::parse(snapshot_html).qualifying_tables == 0 {
        PaginationMode::Grid
    } else {
        PaginationMode::Linear
    }
}

/// What a view must contain before it is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ready {
    Schedule,
    ScheduleOrGrid,
}

impl Ready {
    fn satisfied_by(self, snapshot_html: &str) -> bool {
        table::parse(snapshot_html).qualifying_tables > 0
            || (self == Self::ScheduleOrGrid && has_month_grid(snapshot_html))
    }
}

fn class_has(el: ElementRef<'_>, needles: &[&str]) -> bool {
    el.value()
        .classes()
        .any(|class| needles.iter().any(|n| class.to_lowercase().contains(n)))
}

fn is_day_number(cell: ElementRef<'_>) -> bool {
    clean_text(cell).chars().next().is_some_and(char::is_numeric)
}

/// Weekend and holiday day cells of the first month grid, row by row.
pub fn grid_plan(snapshot_html: &str) -> Option<GridPlan> {
    let html = Html::parse_document(snapshot_html);
    let grid = html.select(&TABLE_SEL).find(|t| table::is_month_grid(*t))?;

    let rows = direct_rows(grid);
    let (header, body) = rows.split_first()?;
    let rest_columns: Vec<usize> = row_cells(*header)
        .into_iter()
        .enumerate()
        .filter(|(_, cell)| {
            let text = clean_text(*cell).to_lowercase();
            REST_DAY_HEADERS.iter().any(|d| text.starts_with(d))
                || class_has(*cell, REST_DAY_CLASSES)
        })
        .map(|(i, _)| i)
        .collect();

    let mut cells = Vec::new();
    for (r, row) in body.iter().enumerate() {
        for (c, cell) in row_cells(*row).into_iter().enumerate() {
            if !is_day_number(cell) {
                continue;
            }
            if rest_columns.contains(&c) || class_has(cell, &["holiday"]) {
                cells.push((r + 1, c));
            }
        }
    }
    Some(GridPlan { cells })
}

/// Document-order index, among every `td`/`th`, of a cell of the month grid.
///
/// The grid is looked up afresh so tables rendered before it, or nested in
/// its cells, do not shift the position.
pub fn grid_cell_position(snapshot_html: &str, row: usize, col: usize) -> Option<usize> {
    let html = Html::parse_document(snapshot_html);
    let grid = html.select(&TABLE_SEL).find(|t| table::is_month_grid(*t))?;
    let rows = direct_rows(grid);
    let cell = *row_cells(*rows.get(row)?).get(col)?;
    html.root_element()
        .select(&CELL_SEL)
        .position(|c| c.id() == cell.id())
}

/// Walks calendar views, handing each snapshot to a callback.
#[derive(Debug, Clone)]
pub struct Paginator {
    /// Snapshots per linear walk; values below 1 act as 1.
    pub max_steps: usize,
    pub max_grid_steps: usize,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Text on the calendar screen, used to re-resolve the context after a click navigates.
    pub calendar_marker: String,
}

impl Paginator {
    /// Walk from the current view until a stop condition.
    ///
    /// Snapshots are delivered as they are taken, so a timeout part-way
    /// through leaves the caller with everything captured before it.
    pub async fn paginate(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        mut on_snapshot: impl FnMut(&Snapshot) + Send,
    ) -> Result<PageWalk, EngineError> {
        let first = self.snapshot(browser, ctx, 0, Ready::ScheduleOrGrid).await?;
        let mode = detect_mode(&first.html);
        debug!(?mode, frame = ?ctx.frame, "Pagination mode detected");
        on_snapshot(&first);

        let (steps, stop) = match mode {
            PaginationMode::Linear => self.walk_linear(browser, ctx, &mut on_snapshot).await?,
            PaginationMode::Grid => {
                self.walk_grid(browser, ctx, &first.html, &mut on_snapshot)
                    .await?
            }
        };
        debug!(?mode, steps, ?stop, "Pagination finished");
        Ok(PageWalk { mode, steps, stop })
    }

    async fn walk_linear(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        on_snapshot: &mut (impl FnMut(&Snapshot) + Send),
    ) -> Result<(usize, StopReason), EngineError> {
        let mut ctx = ctx;
        let mut steps = 1;
        loop {
            if steps >= self.max_steps.max(1) {
                return Ok((steps, StopReason::MaxSteps));
            }
            let Some(next) = next_control(browser, ctx).await? else {
                return Ok((steps, StopReason::NoNextControl));
            };
            browser.click(&next).await?;
            ctx = context::ensure(browser, ctx, &self.calendar_marker).await?;

            let snapshot = self.snapshot(browser, ctx, steps, Ready::Schedule).await?;
            on_snapshot(&snapshot);
            steps += 1;
        }
    }

    async fn walk_grid(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        first_html: &str,
        on_snapshot: &mut (impl FnMut(&Snapshot) + Send),
    ) -> Result<(usize, StopReason), EngineError> {
        let mut ctx = ctx;
        let mut steps = 1;
        let mut plan = grid_plan(first_html);
        let mut cursor = 0;

        loop {
            if steps >= self.max_grid_steps.max(1) {
                return Ok((steps, StopReason::MaxSteps));
            }

            let planned = plan.as_ref().and_then(|p| p.cells.get(cursor).copied());
            let month_advanced = match planned {
                Some((row, col)) => {
                    cursor += 1;
                    let Some(cell) = grid_cell(browser, ctx, row, col).await? else {
                        return Ok((steps, StopReason::NoMoreCells));
                    };
                    trace!(row, col, "Opening grid day");
                    browser.click(&cell).await?;
                    false
                }
                None => {
                    let Some(next) = next_control(browser, ctx).await? else {
                        return Ok((steps, StopReason::NoNextControl));
                    };
                    browser.click(&next).await?;
                    true
                }
            };
            ctx = context::ensure(browser, ctx, &self.calendar_marker).await?;

            let snapshot = self
                .snapshot(browser, ctx, steps, Ready::ScheduleOrGrid)
                .await?;
            on_snapshot(&snapshot);
            steps += 1;

            if month_advanced {
                plan = grid_plan(&snapshot.html);
                cursor = 0;
            }
        }
    }

    /// Poll the view until it is `ready`, then capture it.
    async fn snapshot(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        step: usize,
        ready: Ready,
    ) -> Result<Snapshot, EngineError> {
        let start = Instant::now();
        loop {
            let html = browser.page_source(ctx.frame).await?;
            if ready.satisfied_by(&html) {
                return Ok(Snapshot { html, step });
            }
            if start.elapsed() >= self.wait_timeout {
                return Err(EngineError::NavigationTimeout {
                    what: "schedule table".to_string(),
                    waited: self.wait_timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(self.wait_timeout)).await;
        }
    }
}

async fn usable(browser: &dyn Browser, el: &ElementHandle) -> Result<bool, BrowserError> {
    if !browser.is_visible(el).await? || browser.attribute(el, "disabled").await?.is_some() {
        return Ok(false);
    }
    let class = browser.attribute(el, "class").await?.unwrap_or_default();
    Ok(!class.contains("disabled"))
}

/// Visible, enabled control advancing to the next time window.
async fn next_control(
    browser: &dyn Browser,
    ctx: NavigationContext,
) -> Result<Option<ElementHandle>, BrowserError> {
    let queries = [
        Query::css(NEXT_CSS),
        Query::css(NEXT_LABEL_CSS).containing_any(NEXT_LABELS.iter().copied()),
    ];
    for query in &queries {
        for candidate in browser.find(ctx.frame, query).await? {
            if usable(browser, &candidate).await? {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Re-locate a planned grid cell in the live page; prefers a link inside it.
async fn grid_cell(
    browser: &dyn Browser,
    ctx: NavigationContext,
    row: usize,
    col: usize,
) -> Result<Option<ElementHandle>, BrowserError> {
    let source = browser.page_source(ctx.frame).await?;
    let Some(position) = grid_cell_position(&source, row, col) else {
        return Ok(None);
    };
    let cells = browser.find(ctx.frame, &Query::css("td, th")).await?;
    let Some(cell) = cells.get(position) else {
        return Ok(None);
    };
    let links = browser.find(ctx.frame, &Query::css("a").within(cell)).await?;
    Ok(Some(links.into_iter().next().unwrap_or_else(|| cell.clone())))
}
