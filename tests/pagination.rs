//! Linear and month-grid calendar walks.

mod helpers;

use facility_scout::browser::Browser;
use facility_scout::scraper::EngineError;
use facility_scout::scraper::context::{self, NavigationContext};
use facility_scout::scraper::paginator::{PaginationMode, Paginator, StopReason};
use helpers::{Effect, FakeBrowser, FakePage, Site, url};
use std::time::Duration;

fn paginator(max_steps: usize, max_grid_steps: usize) -> Paginator {
    Paginator {
        max_steps,
        max_grid_steps,
        wait_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
        calendar_marker: "空き状況".into(),
    }
}

fn week_html(n: usize, next: &str) -> String {
    format!(
        r#"<html><body><p>空き状況</p>
        <table><tr><th>日付</th><th>09:00-11:00</th></tr><tr><td>4/{n}</td><td>○</td></tr></table>
        {next}
        </body></html>"#
    )
}

/// `count` weekly pages chained by a "next" button; the last has none.
fn weeks(count: usize) -> Site {
    let mut site = Site::new();
    for n in 1..=count {
        let page = if n == count {
            FakePage::new(week_html(n, ""))
        } else {
            FakePage::new(week_html(n, r#"<button class="next">次へ</button>"#)).on_click(
                "button.next",
                Effect::Navigate(url(&format!("/week/{}", n + 1))),
            )
        };
        site = site.page(url(&format!("/week/{n}")), page);
    }
    site
}

async fn open(browser: &FakeBrowser, path: &str) -> NavigationContext {
    browser.navigate(&url(path)).await.unwrap();
    NavigationContext::top(browser.page_epoch().await.unwrap())
}

#[tokio::test]
async fn linear_walk_stops_at_max_steps() {
    let browser = weeks(5).browser();
    let ctx = open(&browser, "/week/1").await;

    let mut steps = Vec::new();
    let walk = paginator(3, 30)
        .paginate(&browser, ctx, |snapshot| steps.push(snapshot.step))
        .await
        .unwrap();

    assert_eq!(walk.mode, PaginationMode::Linear);
    assert_eq!(walk.stop, StopReason::MaxSteps);
    assert_eq!(walk.steps, 3);
    assert_eq!(steps, vec![0, 1, 2]);
    assert_eq!(browser.navigations().len(), 3);
}

#[tokio::test]
async fn zero_step_limit_still_takes_only_one_snapshot() {
    let browser = weeks(3).browser();
    let ctx = open(&browser, "/week/1").await;

    let mut steps = Vec::new();
    let walk = paginator(0, 0)
        .paginate(&browser, ctx, |snapshot| steps.push(snapshot.step))
        .await
        .unwrap();

    assert_eq!(walk.stop, StopReason::MaxSteps);
    assert_eq!(walk.steps, 1);
    assert_eq!(steps, vec![0]);
    assert!(browser.clicks().is_empty());
}

#[tokio::test]
async fn linear_walk_stops_when_next_control_disappears() {
    let browser = weeks(4).browser();
    let ctx = open(&browser, "/week/1").await;

    let mut dates = Vec::new();
    let walk = paginator(10, 30)
        .paginate(&browser, ctx, |snapshot| {
            dates.extend((1..=4).filter(|n| snapshot.html.contains(&format!("4/{n}<"))));
        })
        .await
        .unwrap();

    assert_eq!(walk.stop, StopReason::NoNextControl);
    assert_eq!(walk.steps, 4);
    assert_eq!(dates, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn disabled_or_hidden_next_controls_are_ignored() {
    let controls = [
        r#"<button class="next" disabled>次へ</button>"#,
        r#"<a class="next-week disabled" href="/week/2">次週</a>"#,
        r#"<a class="next-week" style="display: none" href="/week/2">次週</a>"#,
    ];
    for control in controls {
        let page = FakePage::new(week_html(1, control))
            .on_click(".next, .next-week", Effect::Navigate(url("/week/2")));
        let browser = Site::new()
            .page(url("/week/1"), page)
            .page(url("/week/2"), FakePage::new(week_html(2, "")))
            .browser();
        let ctx = open(&browser, "/week/1").await;

        let walk = paginator(10, 30).paginate(&browser, ctx, |_| {}).await.unwrap();
        assert_eq!(walk.stop, StopReason::NoNextControl, "{control}");
        assert_eq!(walk.steps, 1, "{control}");
        assert!(browser.clicks().is_empty(), "{control}");
    }
}

#[tokio::test]
async fn labelled_next_control_without_class() {
    let page = FakePage::new(week_html(1, r##"<a href="#">翌週 ≫</a>"##))
        .on_click("a", Effect::Navigate(url("/week/2")));
    let browser = Site::new()
        .page(url("/week/1"), page)
        .page(url("/week/2"), FakePage::new(week_html(2, "")))
        .browser();
    let ctx = open(&browser, "/week/1").await;

    let walk = paginator(10, 30).paginate(&browser, ctx, |_| {}).await.unwrap();
    assert_eq!(walk.steps, 2);
    assert_eq!(browser.clicks(), vec!["翌週 ≫"]);
}

#[tokio::test]
async fn missing_table_times_out() {
    let browser = Site::new()
        .page(url("/loading"), FakePage::new("<html><body><p>読み込み中</p></body></html>"))
        .browser();
    let ctx = open(&browser, "/loading").await;

    let mut snapshots = 0;
    let err = paginator(10, 30)
        .paginate(&browser, ctx, |_| snapshots += 1)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NavigationTimeout { ref what, .. } if what == "schedule table"));
    assert_eq!(snapshots, 0);
}

#[tokio::test]
async fn layout_table_does_not_count_as_a_rendered_calendar() {
    let page = FakePage::new(week_html(1, "")).rendering_first(
        "<html><body><p>空き状況</p><table><tr><td>メニュー</td></tr></table></body></html>",
        3,
    );
    let browser = Site::new().page(url("/week/1"), page).browser();
    let ctx = open(&browser, "/week/1").await;

    let mut captured = Vec::new();
    let walk = paginator(10, 30)
        .paginate(&browser, ctx, |snapshot| captured.push(snapshot.html.clone()))
        .await
        .unwrap();

    assert_eq!(walk.steps, 1);
    assert_eq!(captured.len(), 1);
    assert!(captured[0].contains("4/1<"));
}

#[tokio::test]
async fn context_follows_calendar_between_frame_and_top_document() {
    let framed = |n: usize, next: &str| {
        FakePage::new(r#"<html><body><header>藤沢市</header><iframe src="/f"></iframe></body></html>"#)
            .frame(week_html(n, next))
    };
    let next = r#"<button class="next">次へ</button>"#;
    let browser = Site::new()
        .page(
            url("/week/1"),
            framed(1, next).on_click("button.next", Effect::Navigate(url("/week/2"))),
        )
        .page(
            url("/week/2"),
            FakePage::new(week_html(2, next))
                .on_click("button.next", Effect::Navigate(url("/week/3"))),
        )
        .page(url("/week/3"), framed(3, ""))
        .browser();
    browser.navigate(&url("/week/1")).await.unwrap();
    let start = NavigationContext::top(browser.page_epoch().await.unwrap());
    let ctx = context::resolve(&browser, start, "空き状況").await.unwrap().context();

    let mut dates = Vec::new();
    let walk = paginator(10, 30)
        .paginate(&browser, ctx, |snapshot| {
            dates.extend((1..=3).filter(|n| snapshot.html.contains(&format!("4/{n}<"))));
        })
        .await
        .unwrap();

    assert_eq!(walk.stop, StopReason::NoNextControl);
    assert_eq!(walk.steps, 3);
    assert_eq!(dates, vec![1, 2, 3]);
}

#[tokio::test]
async fn timeout_mid_walk_keeps_earlier_snapshots() {
    let first = FakePage::new(week_html(1, r#"<button class="next">次へ</button>"#))
        .on_click("button.next", Effect::Navigate(url("/broken")));
    let browser = Site::new()
        .page(url("/week/1"), first)
        .page(url("/broken"), FakePage::new("<html><body>エラー</body></html>"))
        .browser();
    let ctx = open(&browser, "/week/1").await;

    let mut steps = Vec::new();
    let result = paginator(10, 30)
        .paginate(&browser, ctx, |snapshot| steps.push(snapshot.step))
        .await;

    assert!(result.is_err());
    assert_eq!(steps, vec![0]);
}

// --- month grid ---

const MARCH_GRID: &str = r##"<table class="calendar">
<tr><th>日</th><th>月</th><th>火</th><th>水</th><th>木</th><th>金</th><th>土</th></tr>
<tr><td></td><td></td><td></td><td></td><td></td>
    <td id="d1"><a href="#">1</a></td><td id="d2"><a href="#">2</a></td></tr>
<tr><td id="d3"><a href="#">3</a></td><td id="d4"><a href="#">4</a></td>
    <td id="d5"><a href="#">5</a></td><td id="d6"><a href="#">6</a></td>
    <td id="d7"><a href="#">7</a></td><td id="d8"><a href="#">8</a></td>
    <td id="d9"><a href="#">9</a></td></tr>
</table>"##;

fn with_day_links(mut page: FakePage) -> FakePage {
    for day in 1..=9 {
        page = page.on_click(
            &format!("#d{day} a"),
            Effect::Navigate(url(&format!("/day/{day}"))),
        );
    }
    page
}

/// Day pages repeat the grid and show that day's schedule below it, or above it.
fn march_site_with(detail_first: bool) -> Site {
    let mut site = Site::new().page(
        url("/month"),
        with_day_links(FakePage::new(format!(
            "<html><body><p>空き状況</p>{MARCH_GRID}</body></html>"
        ))),
    );
    for day in 1..=9 {
        let detail = format!(
            r#"<table><tr><th>日付</th><th>09:00-11:00</th></tr><tr><td>3/{day}</td><td>○</td></tr></table>"#
        );
        let html = if detail_first {
            format!("<html><body><p>空き状況</p>{detail}{MARCH_GRID}</body></html>")
        } else {
            format!("<html><body><p>空き状況</p>{MARCH_GRID}{detail}</body></html>")
        };
        site = site.page(url(&format!("/day/{day}")), with_day_links(FakePage::new(html)));
    }
    site
}

fn march_site() -> Site {
    march_site_with(false)
}

#[tokio::test]
async fn grid_walk_visits_weekend_days_in_order() {
    let browser = march_site().browser();
    let ctx = open(&browser, "/month").await;

    let mut days = Vec::new();
    let walk = paginator(12, 30)
        .paginate(&browser, ctx, |snapshot| {
            days.extend((1..=9).filter(|d| snapshot.html.contains(&format!("3/{d}<"))));
        })
        .await
        .unwrap();

    assert_eq!(walk.mode, PaginationMode::Grid);
    assert_eq!(walk.stop, StopReason::NoNextControl);
    assert_eq!(walk.steps, 4);
    assert_eq!(browser.clicks(), vec!["2", "3", "9"]);
    assert_eq!(days, vec![2, 3, 9]);
}

#[tokio::test]
async fn grid_walk_respects_its_own_step_limit() {
    let browser = march_site().browser();
    let ctx = open(&browser, "/month").await;

    let walk = paginator(12, 2).paginate(&browser, ctx, |_| {}).await.unwrap();

    assert_eq!(walk.stop, StopReason::MaxSteps);
    assert_eq!(walk.steps, 2);
    assert_eq!(browser.clicks(), vec!["2"]);
}

#[tokio::test]
async fn grid_walk_finds_the_grid_below_a_day_schedule() {
    let browser = march_site_with(true).browser();
    let ctx = open(&browser, "/month").await;

    let mut days = Vec::new();
    let walk = paginator(12, 30)
        .paginate(&browser, ctx, |snapshot| {
            days.extend((1..=9).filter(|d| snapshot.html.contains(&format!("3/{d}<"))));
        })
        .await
        .unwrap();

    assert_eq!(walk.stop, StopReason::NoNextControl);
    assert_eq!(walk.steps, 4);
    assert_eq!(browser.clicks(), vec!["2", "3", "9"]);
    assert_eq!(days, vec![2, 3, 9]);
}
