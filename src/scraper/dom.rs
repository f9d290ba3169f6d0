//! DOM-query capability shared by every backend.
//!
//! A [`Locator`] is a lazy chain of query steps; building one never touches
//! the page. A [`Page`] resolves locators on demand and performs immediate,
//! non-waiting reads. [`Region`] pairs the two and layers bounded waits on
//! top, which is what parsers work with.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between polls while waiting on an element.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors raised by DOM queries.
#[derive(Debug, Clone, Error)]
pub enum DomError {
    /// The element did not reach the requested state in time.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// An immediate operation found no element.
    #[error("no element matches {0}")]
    Missing(String),

    /// The underlying browser or parser failed.
    #[error("browser error: {0}")]
    Backend(String),
}

/// One step of a locator chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Descendants of every current match that satisfy a CSS selector.
    Css(String),
    /// Keep only the n-th current match (document order).
    Nth(usize),
    /// Keep only the last current match.
    Last,
    /// Keep matches that own a descendant `label` element whose direct text
    /// contains (or, when `exact`, equals after trimming) `text`.
    HasText {
        label: String,
        text: String,
        exact: bool,
    },
    /// Keep matches whose own direct text contains (or equals) `text`.
    OwnText { text: String, exact: bool },
}

/// Lazy, cloneable element query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    /// Locator rooted at the document.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            steps: vec![Step::Css(selector.into())],
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn with(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    pub fn locate(&self, selector: impl Into<String>) -> Self {
        self.with(Step::Css(selector.into()))
    }

    pub fn nth(&self, index: usize) -> Self {
        self.with(Step::Nth(index))
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    pub fn last(&self) -> Self {
        self.with(Step::Last)
    }

    pub fn has_text(&self, label: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(Step::HasText {
            label: label.into(),
            text: text.into(),
            exact: false,
        })
    }

    pub fn has_exact_text(&self, label: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(Step::HasText {
            label: label.into(),
            text: text.into(),
            exact: true,
        })
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        self.with(Step::OwnText {
            text: text.into(),
            exact: false,
        })
    }

    pub fn with_exact_text(&self, text: impl Into<String>) -> Self {
        self.with(Step::OwnText {
            text: text.into(),
            exact: true,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match step {
                Step::Css(selector) => write!(f, "{}", selector)?,
                Step::Nth(n) => write!(f, "nth={}", n)?,
                Step::Last => f.write_str("last")?,
                Step::HasText { label, text, exact } => {
                    let op = if *exact { "=" } else { "*=" };
                    write!(f, "has({} {} {:?})", label, op, text)?
                }
                Step::OwnText { text, exact } => {
                    let op = if *exact { "=" } else { "*=" };
                    write!(f, "text{}{:?}", op, text)?
                }
            }
        }
        Ok(())
    }
}

/// Render state of the first element a locator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Detached,
    Hidden,
    Visible,
}

/// Immediate DOM operations a page backend must provide.
///
/// Element operations act on the first match of the locator.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), DomError>;

    async fn reload(&self) -> Result<(), DomError>;

    async fn url(&self) -> Result<String, DomError>;

    async fn title(&self) -> Result<String, DomError>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DomError>;

    async fn count(&self, locator: &Locator) -> Result<usize, DomError>;

    async fn state(&self, locator: &Locator) -> Result<ElementState, DomError>;

    /// Text content of the first match, `None` when nothing matches.
    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, DomError>;

    /// Attribute of the first match, `None` when the element or the attribute is absent.
    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DomError>;

    async fn click(&self, locator: &Locator) -> Result<(), DomError>;

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), DomError>;
}

/// Which state a wait requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    /// Laid out and shown.
    Visible,
    /// Present in the tree, possibly behind an unopened tab.
    Attached,
}

impl WaitState {
    fn satisfied_by(self, state: ElementState) -> bool {
        match self {
            WaitState::Visible => state == ElementState::Visible,
            WaitState::Attached => state != ElementState::Detached,
        }
    }
}

/// A locator bound to the page it was built for.
///
/// The borrow keeps a region from outliving its page.
#[derive(Clone)]
pub struct Region<'p> {
    page: &'p dyn Page,
    locator: Locator,
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Region").field(&self.locator.to_string()).finish()
    }
}

impl<'p> Region<'p> {
    pub fn new(page: &'p dyn Page, locator: Locator) -> Self {
        Self { page, locator }
    }

    /// Region for a document-level CSS selector.
    pub fn root(page: &'p dyn Page, selector: &str) -> Self {
        Self::new(page, Locator::css(selector))
    }

    pub fn page(&self) -> &'p dyn Page {
        self.page
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    fn derive(&self, locator: Locator) -> Region<'p> {
        Region {
            page: self.page,
            locator,
        }
    }

    pub fn locate(&self, selector: &str) -> Region<'p> {
        self.derive(self.locator.locate(selector))
    }

    pub fn nth(&self, index: usize) -> Region<'p> {
        self.derive(self.locator.nth(index))
    }

    pub fn first(&self) -> Region<'p> {
        self.derive(self.locator.first())
    }

    pub fn last(&self) -> Region<'p> {
        self.derive(self.locator.last())
    }

    pub fn has_text(&self, label: &str, text: &str) -> Region<'p> {
        self.derive(self.locator.has_text(label, text))
    }

    pub fn has_exact_text(&self, label: &str, text: &str) -> Region<'p> {
        self.derive(self.locator.has_exact_text(label, text))
    }

    pub fn with_text(&self, text: &str) -> Region<'p> {
        self.derive(self.locator.with_text(text))
    }

    pub fn with_exact_text(&self, text: &str) -> Region<'p> {
        self.derive(self.locator.with_exact_text(text))
    }

    pub async fn count(&self) -> Result<usize, DomError> {
        self.page.count(&self.locator).await
    }

    pub async fn state(&self) -> Result<ElementState, DomError> {
        self.page.state(&self.locator).await
    }

    /// Wait until the region reaches `state`.
    pub async fn wait_for(&self, state: WaitState, timeout: Duration) -> Result<(), DomError> {
        let locator = &self.locator;
        let page = self.page;
        poll_until(timeout, || locator.to_string(), move || async move {
            let current = page.state(locator).await?;
            Ok(state.satisfied_by(current).then_some(()))
        })
        .await
    }

    /// Text content, waiting up to `timeout` for the element to attach.
    pub async fn text(&self, timeout: Duration) -> Result<String, DomError> {
        let locator = &self.locator;
        let page = self.page;
        poll_until(timeout, || locator.to_string(), move || async move {
            page.text_content(locator).await
        })
        .await
    }

    /// Attribute value, waiting up to `timeout` for the element to attach.
    pub async fn attribute(&self, name: &str, timeout: Duration) -> Result<Option<String>, DomError> {
        self.wait_for(WaitState::Attached, timeout).await?;
        self.page.attribute(&self.locator, name).await
    }

    /// Click once the element is visible. Resolves after the click dispatched.
    pub async fn click(&self, timeout: Duration) -> Result<(), DomError> {
        self.wait_for(WaitState::Visible, timeout).await?;
        self.page.click(&self.locator).await
    }

    pub async fn scroll_into_view(&self, timeout: Duration) -> Result<(), DomError> {
        self.wait_for(WaitState::Attached, timeout).await?;
        self.page.scroll_into_view(&self.locator).await
    }
}

/// Poll `check` until it yields a value or `timeout` elapses.
///
/// The check always runs at least once. Check errors count as "not yet".
async fn poll_until<T, D, F, Fut>(timeout: Duration, describe: D, mut check: F) -> Result<T, DomError>
where
    D: Fn() -> String,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, DomError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match check().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::trace!("check on {} failed: {}", describe(), e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DomError::Timeout {
                what: describe(),
                after: timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
