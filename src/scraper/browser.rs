//! Browser automation using chromiumoxide.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::dom::{DomError, ElementState, Locator, Page, Step};
use crate::config::BrowserConfig;
use crate::retry::{with_backoff, Failure};

/// Browser wrapper for the crawl workers
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
}

fn default_chrome_path() -> &'static str {
    if cfg!(target_os = "macos") {
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
    } else if cfg!(target_os = "windows") {
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
    } else {
        "google-chrome"
    }
}

fn chrome_config(config: &BrowserConfig) -> Result<ChromeConfig> {
    let chrome_path = config.chrome_path.as_deref().unwrap_or_else(|| default_chrome_path());

    let mut builder = ChromeConfig::builder()
        .chrome_executable(chrome_path)
        .no_sandbox()
        .disable_default_args()
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--mute-audio")
        .arg("--lang=en-GB")
        .window_size(config.window_width, config.window_height);

    if config.headless {
        builder = builder.arg("--headless=new");
    }
    if let Some(proxy) = config.proxy_server.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }
    for arg in &config.extra_args {
        builder = builder.arg(arg.as_str());
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))
}

impl Browser {
    /// Launch Chrome. A config that does not build fails at once; launch
    /// failures are retried on `config.retry`.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = with_backoff(&config.retry, "browser launch", || async move {
            let chrome = chrome_config(config).map_err(Failure::permanent)?;
            ChromeBrowser::launch(chrome)
                .await
                .map_err(|e| Failure::transient(anyhow::anyhow!("Failed to launch browser: {}", e)))
        })
        .await?;

        // Spawn handler task - must keep running for browser to work
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        info!("Browser launched (headless: {})", config.headless);
        Ok(Self { browser, handle })
    }

    /// Open a blank tab for one worker
    pub async fn new_page(&self) -> Result<ChromePage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to create new page")?;
        Ok(ChromePage { page })
    }

    /// Close the browser
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.handle.abort();
        Ok(())
    }
}

/// A Chrome tab driven through the DOM-query capability.
///
/// Locators are resolved in the page with one script per query, so a query
/// always sees the live document.
pub struct ChromePage {
    page: chromiumoxide::page::Page,
}

fn backend(e: impl std::fmt::Display) -> DomError {
    DomError::Backend(e.to_string())
}

fn steps_json(locator: &Locator) -> Value {
    let steps: Vec<Value> = locator
        .steps()
        .iter()
        .map(|step| match step {
            Step::Css(selector) => json!({ "css": selector }),
            Step::Nth(index) => json!({ "nth": index }),
            Step::Last => json!({ "last": true }),
            Step::HasText { label, text, exact } => {
                json!({ "has": { "label": label, "text": text, "exact": exact } })
            }
            Step::OwnText { text, exact } => json!({ "own": { "text": text, "exact": exact } }),
        })
        .collect();
    Value::Array(steps)
}

const RESOLVER: &str = r#"
const ownText = (el) => Array.from(el.childNodes)
  .filter((n) => n.nodeType === Node.TEXT_NODE)
  .map((n) => n.textContent)
  .join('');
const textMatches = (t, text, exact) => exact ? t.trim() === text.trim() : t.includes(text);
let cur = null;
for (const s of steps) {
  if (s.css !== undefined) {
    if (cur === null) {
      cur = Array.from(document.querySelectorAll(s.css));
    } else {
      const seen = new Set();
      const out = [];
      for (const scope of cur) {
        for (const el of scope.querySelectorAll(s.css)) {
          if (!seen.has(el)) { seen.add(el); out.push(el); }
        }
      }
      cur = out;
    }
  } else if (s.nth !== undefined) {
    const all = cur ?? [document.documentElement];
    cur = s.nth < all.length ? [all[s.nth]] : [];
  } else if (s.last) {
    const all = cur ?? [document.documentElement];
    cur = all.length ? [all[all.length - 1]] : [];
  } else if (s.has) {
    cur = (cur ?? [document.documentElement]).filter((scope) =>
      Array.from(scope.querySelectorAll(s.has.label))
        .some((l) => textMatches(ownText(l), s.has.text, s.has.exact)));
  } else if (s.own) {
    cur = (cur ?? []).filter((el) => textMatches(ownText(el), s.own.text, s.own.exact));
  }
}
cur = cur ?? [];
const el = cur.length ? cur[0] : null;
const visible = (e) => {
  const style = getComputedStyle(e);
  const rect = e.getBoundingClientRect();
  return style.display !== 'none' && style.visibility !== 'hidden' && (rect.width > 0 || rect.height > 0);
};
switch (op.kind) {
  case 'count': return cur.length;
  case 'state': return el === null ? 'detached' : (visible(el) ? 'visible' : 'hidden');
  case 'text': return el === null ? null : el.textContent;
  case 'attr': return el === null ? null : el.getAttribute(op.name);
  case 'click': if (el === null) return false; el.click(); return true;
  case 'scroll': if (el === null) return false; el.scrollIntoView({ block: 'center' }); return true;
}
return null;
"#;

fn script(locator: &Locator, op: Value) -> String {
    format!(
        "(() => {{ const steps = {}; const op = {}; return JSON.stringify((() => {{ {} }})()); }})()",
        steps_json(locator),
        op,
        RESOLVER
    )
}

impl ChromePage {
    async fn query<T: DeserializeOwned>(&self, locator: &Locator, op: Value) -> Result<T, DomError> {
        let encoded: String = self
            .page
            .evaluate(script(locator, op))
            .await
            .map_err(backend)?
            .into_value()
            .map_err(backend)?;
        serde_json::from_str(&encoded).map_err(backend)
    }

    async fn act(&self, locator: &Locator, kind: &str) -> Result<(), DomError> {
        let found: bool = self.query(locator, json!({ "kind": kind })).await?;
        if found {
            Ok(())
        } else {
            Err(DomError::Missing(locator.to_string()))
        }
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), DomError> {
        self.page.goto(url).await.map_err(backend)?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), DomError> {
        self.page.reload().await.map_err(backend)?;
        Ok(())
    }

    async fn url(&self) -> Result<String, DomError> {
        Ok(self.page.url().await.map_err(backend)?.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, DomError> {
        Ok(self.page.get_title().await.map_err(backend)?.unwrap_or_default())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DomError> {
        let params = SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page.execute(params).await.map_err(backend)?;
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize, DomError> {
        self.query(locator, json!({ "kind": "count" })).await
    }

    async fn state(&self, locator: &Locator) -> Result<ElementState, DomError> {
        let state: String = self.query(locator, json!({ "kind": "state" })).await?;
        Ok(match state.as_str() {
            "visible" => ElementState::Visible,
            "hidden" => ElementState::Hidden,
            _ => ElementState::Detached,
        })
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, DomError> {
        self.query(locator, json!({ "kind": "text" })).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DomError> {
        self.query(locator, json!({ "kind": "attr", "name": name })).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), DomError> {
        self.act(locator, "click").await
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), DomError> {
        self.act(locator, "scroll").await
    }
}
