//! Schedule table extraction from rendered page snapshots.
//!
//! A schedule table has time-slot headers in its first row and one row per
//! date, with status glyphs (or status images) in the remaining cells:
//!
//! ```text
//! | 日付      | 09:00-11:00 | 11:00-13:00 | ... |
//! | 3/15(土)  | ○           | ×           | ... |
//! ```
//!
//! Pages also carry layout tables and month-grid navigation calendars, which
//! are rejected before any row is read.

use crate::models::SlotStatus;
use crate::scraper::status;
use crate::utils::collapse_whitespace;
use html_scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::trace;

/// Time-slot label used when the header row is shorter than a data row.
pub const UNKNOWN_SLOT: &str = "unknown";

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

const WEEKDAY_HEADERS: &[&str] = &[
    "日", "月", "火", "水", "木", "金", "土", "sun", "mon", "tue", "wed", "thu", "fri", "sat",
];

/// One bookable cell: raw labels plus its classified status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSlot {
    pub raw_date: String,
    pub raw_time_slot: String,
    pub status: SlotStatus,
}

/// Per-snapshot extraction result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableScan {
    pub slots: Vec<RawSlot>,
    /// Tables that looked like schedules, whether or not they yielded slots.
    pub qualifying_tables: usize,
}

/// Element text with whitespace collapsed.
pub(crate) fn clean_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// `tr` elements belonging to this table, skipping rows of nested tables.
pub(crate) fn direct_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// `th`/`td` children of a row.
pub(crate) fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
        .collect()
}

fn image_hints(cell: ElementRef<'_>) -> Vec<String> {
    cell.select(&IMG_SEL)
        .flat_map(|img| {
            [img.attr("alt"), img.attr("title"), img.attr("src")]
                .into_iter()
                .flatten()
                .map(str::to_string)
        })
        .collect()
}

/// Whether a table's first row is a Sunday..Saturday calendar header.
pub fn is_month_grid(table: ElementRef<'_>) -> bool {
    let rows = direct_rows(table);
    let Some(header) = rows.first() else {
        return false;
    };
    let cells = row_cells(*header);
    cells.len() == 7
        && cells.iter().all(|cell| {
            let text = clean_text(*cell).to_lowercase();
            WEEKDAY_HEADERS.iter().any(|day| text.starts_with(day))
        })
}

fn is_schedule_table(table: ElementRef<'_>) -> bool {
    // Wrapper tables contain the real schedule; parse the inner one only.
    if table.select(&TABLE_SEL).next().is_some() {
        return false;
    }
    if is_month_grid(table) {
        return false;
    }
    let text = table.text().collect::<String>();
    status::mentions_indicator(&text)
        || table
            .select(&IMG_SEL)
            .flat_map(|img| [img.attr("alt"), img.attr("src")].into_iter().flatten())
            .any(status::image_is_indicator)
}

/// Extract bookable slots from one schedule table.
fn parse_table(table: ElementRef<'_>) -> Vec<RawSlot> {
    let rows = direct_rows(table);
    let Some((header_row, body)) = rows.split_first() else {
        return Vec::new();
    };
    let headers: Vec<String> = row_cells(*header_row)
        .into_iter()
        .map(clean_text)
        .collect();

    let mut slots = Vec::new();
    for row in body {
        let cells = row_cells(*row);
        let Some((date_cell, status_cells)) = cells.split_first() else {
            continue;
        };
        let raw_date = clean_text(*date_cell);

        for (i, cell) in status_cells.iter().enumerate() {
            let text = clean_text(*cell);
            let Some(status) = status::normalize(&text, &image_hints(*cell)).status() else {
                if !text.is_empty() {
                    trace!(raw_date = raw_date.as_str(), cell = text.as_str(), "cell discarded");
                }
                continue;
            };
            let raw_time_slot = headers
                .get(i + 1)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SLOT.to_string());
            slots.push(RawSlot {
                raw_date: raw_date.clone(),
                raw_time_slot,
                status,
            });
        }
    }
    slots
}

/// Parse every schedule table in a page snapshot.
pub fn parse(snapshot_html: &str) -> TableScan {
    let html = Html::parse_document(snapshot_html);
    let mut scan = TableScan::default();
    for table in html.select(&TABLE_SEL) {
        if !is_schedule_table(table) {
            continue;
        }
        scan.qualifying_tables += 1;
        scan.slots.extend(parse_table(table));
    }
    scan
}
