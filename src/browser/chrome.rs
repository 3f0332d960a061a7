//! Headless Chromium driver built on `headless_chrome`.
//!
//! `headless_chrome` is a blocking CDP client, so every call hops onto the
//! blocking pool. DOM work is done with small scripts evaluated in the top
//! window; element handles are indices into a registry array kept on that
//! window, which the browser discards on navigation (stale handles).

use super::{Browser, BrowserError, BrowserLauncher, ElementHandle, Frame, Query};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use headless_chrome::{Browser as ChromeProcess, LaunchOptions, Tab};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const STALE_MARKER: &str = "__stale__";

/// Launch settings for a Chromium session.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub user_agent: String,
    /// Pause after clicks and submits so the page can react.
    pub settle_delay: Duration,
    /// Upper bound for page loads.
    pub navigation_timeout: Duration,
}

pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeBrowser;

    async fn launch(&self) -> anyhow::Result<ChromeBrowser> {
        let options = self.options.clone();
        let (process, tab) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let launch = LaunchOptions::default_builder()
                .headless(options.headless)
                .sandbox(false)
                .window_size(Some(options.window_size))
                .path(options.chrome_path.clone())
                .idle_browser_timeout(Duration::from_secs(15 * 60))
                .args(vec![
                    OsStr::new("--disable-dev-shm-usage"),
                    OsStr::new("--disable-gpu"),
                ])
                .build()
                .map_err(|e| anyhow!("invalid Chromium launch options: {e}"))?;

            let process = ChromeProcess::new(launch).context("Failed to start Chromium")?;
            let tab = process.new_tab().context("Failed to open tab")?;
            tab.set_default_timeout(options.navigation_timeout);
            tab.set_user_agent(&options.user_agent, Some("ja-JP,ja"), None)
                .context("Failed to set user agent")?;
            Ok((process, tab))
        })
        .await
        .map_err(|e| anyhow!("browser launch task failed: {e}"))??;

        info!(
            headless = self.options.headless,
            width = self.options.window_size.0,
            height = self.options.window_size.1,
            "Chromium session started"
        );

        Ok(ChromeBrowser {
            process: Mutex::new(Some(process)),
            tab,
            settle_delay: self.options.settle_delay,
        })
    }
}

/// One live Chromium process with a single tab.
pub struct ChromeBrowser {
    process: Mutex<Option<ChromeProcess>>,
    tab: Arc<Tab>,
    settle_delay: Duration,
}

#[derive(Deserialize)]
struct Reply {
    ok: Option<Value>,
    err: Option<String>,
}

impl ChromeBrowser {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        let guard = self.process.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    /// Evaluate `body` with `doc` bound to the frame's document and decode its return value.
    async fn eval<T: DeserializeOwned + Send + 'static>(
        &self,
        frame: Frame,
        body: String,
        element: Option<u64>,
    ) -> Result<T, BrowserError> {
        self.ensure_open()?;
        let script = wrap_script(frame, &body);
        let tab = self.tab.clone();
        let raw = blocking(move || {
            let result = tab.evaluate(&script, false)?;
            match result.value {
                Some(Value::String(s)) => Ok(s),
                other => Err(anyhow!("unexpected script result: {other:?}")),
            }
        })
        .await?;

        let reply: Reply = serde_json::from_str(&raw).map_err(|e| anyhow!(e))?;
        if let Some(err) = reply.err {
            return Err(match (err.as_str(), frame) {
                ("frame", Frame::Nested(i)) => BrowserError::FrameUnavailable(i),
                (STALE_MARKER, _) => BrowserError::StaleElement(element.unwrap_or_default()),
                _ => BrowserError::Driver(anyhow!("script error: {err}")),
            });
        }
        serde_json::from_value(reply.ok.unwrap_or(Value::Null))
            .map_err(|e| BrowserError::Driver(anyhow!(e)))
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        debug!(url, "navigating");
        let tab = self.tab.clone();
        let url = url.to_owned();
        blocking(move || {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await?;
        self.settle().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        Ok(self.tab.get_url())
    }

    async fn page_epoch(&self) -> Result<u64, BrowserError> {
        self.eval(
            Frame::Top,
            "return Math.floor(window.top.performance.timeOrigin);".into(),
            None,
        )
        .await
    }

    async fn frame_count(&self) -> Result<usize, BrowserError> {
        self.eval(Frame::Top, "return window.top.frames.length;".into(), None)
            .await
    }

    async fn page_source(&self, frame: Frame) -> Result<String, BrowserError> {
        self.eval(
            frame,
            "return doc.documentElement ? doc.documentElement.outerHTML : \"\";".into(),
            None,
        )
        .await
    }

    async fn find(&self, frame: Frame, query: &Query) -> Result<Vec<ElementHandle>, BrowserError> {
        // Anchors from another context can never precede or contain our candidates.
        let foreign = |h: &Option<ElementHandle>| h.as_ref().is_some_and(|h| h.frame != frame);
        if foreign(&query.after) || foreign(&query.within) {
            return Ok(Vec::new());
        }

        let params = json!({
            "css": query.css,
            "text_any": query.text_any,
            "after": query.after.as_ref().map(|h| h.id),
            "within": query.within.as_ref().map(|h| h.id),
        });
        let body = format!(
            r#"const q = {params};
let c = Array.from(doc.querySelectorAll(q.css));
if (q.within !== null) {{ const s = need(q.within); c = c.filter(e => e !== s && s.contains(e)); }}
if (q.after !== null) {{ const a = need(q.after); c = c.filter(e => !a.contains(e) && (a.compareDocumentPosition(e) & 4)); }}
if (q.text_any.length) {{
  c = c.filter(e => {{ const t = label(e); return q.text_any.some(n => t.includes(n)); }});
  c = c.filter(e => !c.some(o => o !== e && e.contains(o)));
}}
return c.map(keep);"#
        );
        let ids: Vec<u64> = self.eval(frame, body, query.after.as_ref().map(|h| h.id)).await?;
        Ok(ids
            .into_iter()
            .map(|id| ElementHandle { frame, id })
            .collect())
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, BrowserError> {
        let body = format!(
            r#"const el = need({id});
const st = el.ownerDocument.defaultView.getComputedStyle(el);
if (st.visibility === "hidden" || st.visibility === "collapse") return false;
return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);"#,
            id = element.id
        );
        self.eval(element.frame, body, Some(element.id)).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let body = format!("return label(need({})).trim();", element.id);
        self.eval(element.frame, body, Some(element.id)).await
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        // `el.href` is already resolved against the owning frame's URL.
        let body = format!(
            r#"const el = need({id}); const n = {name};
if (n === "href" && typeof el.href === "string" && el.hasAttribute("href")) return el.href;
return el.getAttribute(n);"#,
            id = element.id,
            name = json!(name)
        );
        self.eval(element.frame, body, Some(element.id)).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        let body = format!(
            r#"const el = need({id});
el.scrollIntoView({{ block: "center" }});
el.click();
return null;"#,
            id = element.id
        );
        let _: Value = self.eval(element.frame, body, Some(element.id)).await?;
        self.settle().await;
        Ok(())
    }

    async fn submit_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        let body = format!(
            r#"const el = need({id});
el.focus();
el.value = {text};
el.dispatchEvent(new Event("input", {{ bubbles: true }}));
el.dispatchEvent(new Event("change", {{ bubbles: true }}));
if (el.form) {{
  if (el.form.requestSubmit) el.form.requestSubmit(); else el.form.submit();
}} else {{
  for (const type of ["keydown", "keypress", "keyup"]) {{
    el.dispatchEvent(new KeyboardEvent(type, {{ key: "Enter", code: "Enter", keyCode: 13, which: 13, bubbles: true }}));
  }}
}}
return null;"#,
            id = element.id,
            text = json!(text)
        );
        let _: Value = self.eval(element.frame, body, Some(element.id)).await?;
        self.settle().await;
        Ok(())
    }

    async fn close(&self) {
        let process = self
            .process
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match process {
            // Dropping the handle kills the Chromium process.
            Some(process) => {
                if let Err(e) = tokio::task::spawn_blocking(move || drop(process)).await {
                    warn!(error = ?e, "Chromium shutdown task failed");
                }
                debug!("Chromium session closed");
            }
            None => debug!("Chromium session already closed"),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, BrowserError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("driver task failed: {e}"))?
        .map_err(BrowserError::Driver)
}

fn document_expr(frame: Frame) -> String {
    match frame {
        Frame::Top => "window.top.document".to_string(),
        Frame::Nested(i) => format!(
            "(() => {{ try {{ const w = window.top.frames[{i}]; return w ? w.document : null; }} catch (e) {{ return null; }} }})()"
        ),
    }
}

/// Wrap a script body with the handle registry helpers and a JSON reply envelope.
fn wrap_script(frame: Frame, body: &str) -> String {
    format!(
        r#"(() => {{
  try {{
    const refs = (window.top.__scoutRefs = window.top.__scoutRefs || []);
    const doc = {doc};
    if (!doc) return JSON.stringify({{ err: "frame" }});
    const need = (id) => {{ const el = refs[id]; if (!el || !el.isConnected) throw "{stale}"; return el; }};
    const keep = (el) => {{ let i = refs.indexOf(el); if (i < 0) {{ i = refs.length; refs.push(el); }} return i; }};
    const label = (el) => el.tagName === "INPUT" ? (el.value || "") : (el.textContent || "");
    const out = (() => {{ {body} }})();
    return JSON.stringify({{ ok: out === undefined ? null : out }});
  }} catch (e) {{
    return JSON.stringify({{ err: String(e) }});
  }}
}})()"#,
        doc = document_expr(frame),
        stale = STALE_MARKER,
        body = body
    )
}
