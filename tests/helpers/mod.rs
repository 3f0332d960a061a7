//! Scripted in-memory browser and a small fixture copy of the reservation site.
//!
//! Pages are static HTML keyed by URL. Clicks and form submissions are wired
//! to effects with [`FakePage::on_click`] and [`FakePage::on_submit`], and
//! element visibility follows `hidden`, `display: none` and the `hidden`
//! class unless a click rule has revealed the element.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use facility_scout::browser::{Browser, BrowserError, BrowserLauncher, ElementHandle, Frame, Query};
use facility_scout::models::{DateRange, SearchQuery};
use facility_scout::scraper::EngineConfig;
use facility_scout::scraper::dates::Enricher;
use facility_scout::scraper::holidays::HolidayCalendar;
use facility_scout::scraper::paginator::Paginator;
use facility_scout::scraper::search::SearchSetup;
use html_scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum Effect {
    Navigate(String),
    /// Un-hide elements matching `css` once the rule has fired `after_clicks` times.
    Reveal { css: String, after_clicks: usize },
    Nothing,
}

struct ClickRule {
    css: String,
    effect: Effect,
}

#[derive(Default)]
pub struct FakePage {
    html: String,
    /// Top document served for the first `n` reads after loading.
    interim: Option<(String, usize)>,
    frames: Vec<String>,
    rules: Vec<ClickRule>,
    on_submit: Option<String>,
}

impl FakePage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    /// Serve `html` in place of the page until it has been read `reads` times.
    pub fn rendering_first(mut self, html: impl Into<String>, reads: usize) -> Self {
        self.interim = Some((html.into(), reads));
        self
    }

    pub fn frame(mut self, html: impl Into<String>) -> Self {
        self.frames.push(html.into());
        self
    }

    /// Clicking an element matching `css` (or inside one) triggers `effect`.
    pub fn on_click(mut self, css: &str, effect: Effect) -> Self {
        self.rules.push(ClickRule {
            css: css.to_string(),
            effect,
        });
        self
    }

    pub fn on_submit(mut self, url: impl Into<String>) -> Self {
        self.on_submit = Some(url.into());
        self
    }
}

#[derive(Default)]
pub struct Site {
    pages: HashMap<String, FakePage>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, page: FakePage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn browser(self) -> FakeBrowser {
        FakeBrowser::new(Arc::new(self.pages), Arc::new(AtomicUsize::new(0)))
    }

    pub fn launcher(self) -> FakeLauncher {
        FakeLauncher {
            pages: Arc::new(self.pages),
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_launch: false,
        }
    }
}

#[derive(Default)]
struct State {
    url: Option<String>,
    epoch: u64,
    revealed: Vec<String>,
    rule_clicks: HashMap<usize, usize>,
    top_reads: AtomicUsize,
    /// (epoch, frame, element index in document order), indexed by handle id.
    handles: Vec<(u64, Frame, usize)>,
    closed: bool,
    clicks: Vec<String>,
    submissions: Vec<String>,
    navigations: Vec<String>,
}

pub struct FakeBrowser {
    pages: Arc<HashMap<String, FakePage>>,
    state: Mutex<State>,
    closes: Arc<AtomicUsize>,
}

fn driver(message: String) -> BrowserError {
    BrowserError::Driver(anyhow::anyhow!(message))
}

fn selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| driver(format!("invalid selector {css}: {e:?}")))
}

fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

fn self_and_ancestors(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::once(el).chain(el.ancestors().filter_map(ElementRef::wrap))
}

fn is_inside(el: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    el.ancestors().any(|a| a.id() == container.id())
}

fn label(el: ElementRef<'_>) -> String {
    if el.value().name() == "input" {
        el.attr("value").unwrap_or_default().to_string()
    } else {
        el.text().collect()
    }
}

fn visible(el: ElementRef<'_>, revealed: &[Selector]) -> bool {
    self_and_ancestors(el).all(|e| {
        let hidden = e.value().name() == "head"
            || e.attr("hidden").is_some()
            || e
                .attr("style")
                .is_some_and(|s| s.replace(' ', "").contains("display:none"))
            || e.value().classes().any(|c| c == "hidden");
        !hidden || revealed.iter().any(|s| s.matches(&e))
    })
}

impl FakeBrowser {
    fn new(pages: Arc<HashMap<String, FakePage>>, closes: Arc<AtomicUsize>) -> Self {
        Self {
            pages,
            state: Mutex::new(State::default()),
            closes,
        }
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, BrowserError>,
    ) -> Result<T, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        f(&mut state)
    }

    fn page(&self, state: &State) -> Result<&FakePage, BrowserError> {
        let url = state
            .url
            .as_deref()
            .ok_or_else(|| driver("no page loaded".to_string()))?;
        self.pages
            .get(url)
            .ok_or_else(|| driver(format!("no page at {url}")))
    }

    fn source(&self, state: &State, frame: Frame) -> Result<String, BrowserError> {
        let page = self.page(state)?;
        match frame {
            Frame::Top => {
                let reads = state.top_reads.fetch_add(1, Ordering::SeqCst);
                match &page.interim {
                    Some((html, until)) if reads < *until => Ok(html.clone()),
                    _ => Ok(page.html.clone()),
                }
            }
            Frame::Nested(i) => page
                .frames
                .get(i)
                .cloned()
                .ok_or(BrowserError::FrameUnavailable(i)),
        }
    }

    fn load(&self, state: &mut State, url: &str) -> Result<(), BrowserError> {
        if !self.pages.contains_key(url) {
            return Err(driver(format!("no page at {url}")));
        }
        state.url = Some(url.to_string());
        state.epoch += 1;
        state.revealed.clear();
        state.rule_clicks.clear();
        state.top_reads.store(0, Ordering::SeqCst);
        state.navigations.push(url.to_string());
        Ok(())
    }

    fn index_of(state: &State, handle: &ElementHandle) -> Result<usize, BrowserError> {
        let stale = BrowserError::StaleElement(handle.id);
        let Some(&(epoch, frame, index)) = state.handles.get(handle.id as usize) else {
            return Err(stale);
        };
        if epoch != state.epoch || frame != handle.frame {
            return Err(stale);
        }
        Ok(index)
    }

    fn revealed(state: &State) -> Result<Vec<Selector>, BrowserError> {
        state.revealed.iter().map(|css| selector(css)).collect()
    }

    fn element_doc(&self, state: &State, handle: &ElementHandle) -> Result<(Html, usize), BrowserError> {
        let index = Self::index_of(state, handle)?;
        let doc = Html::parse_document(&self.source(state, handle.frame)?);
        Ok((doc, index))
    }

    fn find_in(
        &self,
        state: &mut State,
        frame: Frame,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, BrowserError> {
        let doc = Html::parse_document(&self.source(state, frame)?);
        let all = elements(&doc);
        let css = selector(&query.css)?;

        let mut hits: Vec<usize> = (0..all.len()).filter(|&i| css.matches(&all[i])).collect();

        if let Some(scope) = &query.within {
            if scope.frame != frame {
                return Ok(Vec::new());
            }
            let scope = all[Self::index_of(state, scope)?];
            hits.retain(|&i| is_inside(all[i], scope));
        }
        if let Some(anchor) = &query.after {
            if anchor.frame != frame {
                return Ok(Vec::new());
            }
            let a = Self::index_of(state, anchor)?;
            hits.retain(|&i| i > a && !is_inside(all[i], all[a]));
        }
        if !query.text_any.is_empty() {
            hits.retain(|&i| {
                let text = label(all[i]);
                query.text_any.iter().any(|needle| text.contains(needle.as_str()))
            });
            let matched = hits.clone();
            hits.retain(|&i| !matched.iter().any(|&k| k != i && is_inside(all[k], all[i])));
        }

        let epoch = state.epoch;
        Ok(hits
            .into_iter()
            .map(|i| {
                state.handles.push((epoch, frame, i));
                ElementHandle {
                    frame,
                    id: (state.handles.len() - 1) as u64,
                }
            })
            .collect())
    }

    fn click_in(&self, state: &mut State, handle: &ElementHandle) -> Result<(), BrowserError> {
        let (doc, index) = self.element_doc(state, handle)?;
        let all = elements(&doc);
        let el = *all.get(index).ok_or(BrowserError::StaleElement(handle.id))?;
        state.clicks.push(label(el).trim().to_string());

        let page = self.page(state)?;
        let rule = page.rules.iter().enumerate().find(|(_, rule)| {
            selector(&rule.css).is_ok_and(|s| self_and_ancestors(el).any(|e| s.matches(&e)))
        });
        let Some((i, rule)) = rule else {
            return Ok(());
        };
        match &rule.effect {
            Effect::Navigate(url) => self.load(state, url)?,
            Effect::Reveal { css, after_clicks } => {
                let count = state.rule_clicks.entry(i).or_default();
                *count += 1;
                if *count >= *after_clicks && !state.revealed.contains(css) {
                    state.revealed.push(css.clone());
                }
            }
            Effect::Nothing => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.with_state(|state| self.load(state, url))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.with_state(|state| Ok(state.url.clone().unwrap_or_default()))
    }

    async fn page_epoch(&self) -> Result<u64, BrowserError> {
        self.with_state(|state| Ok(state.epoch))
    }

    async fn frame_count(&self) -> Result<usize, BrowserError> {
        self.with_state(|state| Ok(self.page(state).map(|p| p.frames.len()).unwrap_or(0)))
    }

    async fn page_source(&self, frame: Frame) -> Result<String, BrowserError> {
        self.with_state(|state| self.source(state, frame))
    }

    async fn find(&self, frame: Frame, query: &Query) -> Result<Vec<ElementHandle>, BrowserError> {
        self.with_state(|state| self.find_in(state, frame, query))
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, BrowserError> {
        self.with_state(|state| {
            let (doc, index) = self.element_doc(state, element)?;
            let all = elements(&doc);
            let el = *all.get(index).ok_or(BrowserError::StaleElement(element.id))?;
            Ok(visible(el, &Self::revealed(state)?))
        })
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        self.with_state(|state| {
            let (doc, index) = self.element_doc(state, element)?;
            let all = elements(&doc);
            let el = *all.get(index).ok_or(BrowserError::StaleElement(element.id))?;
            Ok(label(el).trim().to_string())
        })
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.with_state(|state| {
            let (doc, index) = self.element_doc(state, element)?;
            let all = elements(&doc);
            let el = *all.get(index).ok_or(BrowserError::StaleElement(element.id))?;
            Ok(el.attr(name).map(str::to_string))
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.with_state(|state| self.click_in(state, element))
    }

    async fn submit_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.with_state(|state| {
            Self::index_of(state, element)?;
            state.submissions.push(text.to_string());
            if let Some(url) = &self.page(state)?.on_submit {
                self.load(state, url)?;
            }
            Ok(())
        })
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct FakeLauncher {
    pages: Arc<HashMap<String, FakePage>>,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_launch: bool,
}

impl FakeLauncher {
    /// Every launch fails, as when no browser binary is installed.
    pub fn broken() -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_launch: true,
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeBrowser;

    async fn launch(&self) -> anyhow::Result<FakeBrowser> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            anyhow::bail!("browser binary not found");
        }
        Ok(FakeBrowser::new(self.pages.clone(), self.closes.clone()))
    }
}

// --- reservation site fixture ---

pub const BASE: &str = "https://reserve.example";

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub const START_PAGE: &str = r#"<html><head><title>施設予約</title></head><body>
<h1>施設予約システム</h1>
<div class="search">
  <p>施設を検索</p>
  <input type="search" placeholder="施設名・種目で検索">
</div>
</body></html>"#;

pub const RESULTS_TOP: &str = r#"<html><body>
<header>藤沢市 施設予約</header>
<iframe src="/results/frame"></iframe>
</body></html>"#;

pub const RESULTS_FRAME: &str = r#"<html><body>
<p>検索結果 2件</p>
<div class="facility">
  <h3>秩父宮記念体育館</h3>
  <button id="exp-chichibu" class="expand-icon">部屋一覧</button>
  <ul class="rooms-chichibu" style="display: none">
    <li><span>メインアリーナ</span> <a class="btn" href="/calendar/chichibu-main">空き状況</a></li>
    <li><span>サブアリーナ</span> <a id="sub-chichibu" class="btn" href="javascript:void(0)">空き状況</a></li>
  </ul>
</div>
<div class="facility">
  <h3>秋葉台文化体育館</h3>
  <button id="exp-akiba" class="expand-icon">部屋一覧</button>
  <ul class="rooms-akiba" style="display: none">
    <li><span>メインアリーナ</span> <a class="btn" href="/calendar/akiba-main">空き状況</a></li>
  </ul>
</div>
</body></html>"#;

const CHICHIBU_WEEK_1: &str = r##"<html><body>
<h2 class="facility-title">秩父宮記念体育館</h2>
<p>空き状況カレンダー</p>
<table class="schedule">
  <tr><th>日付</th><th>09:00-11:00</th><th>11:00-13:00</th><th>19:00-21:00</th></tr>
  <tr><td>3/16(土)</td><td>○</td><td>×</td><td>△</td></tr>
  <tr><td>3/17(日)</td><td>×</td><td>×</td><td>○</td></tr>
</table>
<a class="next-week" href="#">次週＞</a>
</body></html>"##;

const CHICHIBU_WEEK_2: &str = r#"<html><body>
<h2 class="facility-title">秩父宮記念体育館</h2>
<p>空き状況カレンダー</p>
<table class="schedule">
  <tr><th>日付</th><th>09:00-11:00</th><th>11:00-13:00</th><th>19:00-21:00</th></tr>
  <tr><td>3/17(日)</td><td>×</td><td>×</td><td>○</td></tr>
  <tr><td>3/20(水)</td><td>○</td><td>休館</td><td>×</td></tr>
</table>
<a class="next-week disabled">次週＞</a>
</body></html>"#;

const CHICHIBU_SUB: &str = r#"<html><body>
<h2 class="facility-title">秩父宮記念体育館</h2>
<p>空き状況カレンダー</p>
<table class="schedule">
  <tr><th>日付</th><th>09:00-11:00</th><th>11:00-13:00</th></tr>
  <tr><td>3/16(土)</td><td>×</td><td>×</td></tr>
</table>
</body></html>"#;

const AKIBA_TOP: &str = r#"<html><body><iframe src="/frame/akiba"></iframe></body></html>"#;

const AKIBA_FRAME: &str = r#"<html><body>
<h1>施設予約システム</h1>
<h3>秋葉台文化体育館</h3>
<p>空き状況</p>
<table>
  <tr><th>日付</th><th>13:00-15:00</th><th>19:00-21:00</th></tr>
  <tr><td>3/23(土)</td><td>○</td><td>×</td></tr>
</table>
</body></html>"#;

pub fn start_page() -> FakePage {
    FakePage::new(START_PAGE).on_submit(url("/results"))
}

pub fn results_page() -> FakePage {
    FakePage::new(RESULTS_TOP)
        .frame(RESULTS_FRAME)
        .on_click(
            "#exp-chichibu",
            Effect::Reveal {
                css: "ul.rooms-chichibu".into(),
                after_clicks: 1,
            },
        )
        // This list only opens on the second click.
        .on_click(
            "#exp-akiba",
            Effect::Reveal {
                css: "ul.rooms-akiba".into(),
                after_clicks: 2,
            },
        )
        .on_click("#sub-chichibu", Effect::Navigate(url("/calendar/chichibu-sub")))
}

/// Search page, results in a frame, two facilities and their calendars.
pub fn reservation_site() -> Site {
    Site::new()
        .page(url("/"), start_page())
        .page(url("/results"), results_page())
        .page(
            url("/calendar/chichibu-main"),
            FakePage::new(CHICHIBU_WEEK_1).on_click(
                "a.next-week",
                Effect::Navigate(url("/calendar/chichibu-main?week=2")),
            ),
        )
        .page(url("/calendar/chichibu-main?week=2"), FakePage::new(CHICHIBU_WEEK_2))
        .page(url("/calendar/chichibu-sub"), FakePage::new(CHICHIBU_SUB))
        .page(url("/calendar/akiba-main"), FakePage::new(AKIBA_TOP).frame(AKIBA_FRAME))
}

pub fn engine_config() -> EngineConfig {
    let wait_timeout = Duration::from_millis(200);
    let poll_interval = Duration::from_millis(10);
    EngineConfig {
        search: SearchSetup {
            target_url: url("/"),
            search_marker: "検索".into(),
            results_marker: "検索結果".into(),
            wait_timeout,
            poll_interval,
        },
        calendar_marker: "空き状況".into(),
        paginator: Paginator {
            max_steps: 12,
            max_grid_steps: 30,
            wait_timeout,
            poll_interval,
            calendar_marker: "空き状況".into(),
        },
    }
}

/// Enricher pinned to 2024-03-01 with the statutory holiday calendar.
pub fn enricher() -> Enricher {
    Enricher::new(date(2024, 3, 1), 60, HolidayCalendar::new())
}

pub fn query(facilities: &[&str], rooms: &[&str]) -> SearchQuery {
    SearchQuery {
        keyword: "体育館".into(),
        facility_filters: facilities.iter().map(|s| s.to_string()).collect(),
        room_keywords: rooms.iter().map(|s| s.to_string()).collect(),
        date_range: DateRange::default(),
    }
}
