//! Offline page backend over saved HTML.
//!
//! Used by the `parse` command to replay a captured page and by the test
//! suite. The document is re-parsed per query so the page stays `Send + Sync`.
//! Visibility is approximated from `hidden` attributes and inline
//! `display:none` / `visibility:hidden` styles on the element or its ancestors.

use async_trait::async_trait;
use parking_lot::Mutex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};

use super::dom::{DomError, ElementState, Locator, Page, Step};

/// A static page built from an HTML string.
pub struct SnapshotPage {
    url: Mutex<String>,
    html: Mutex<String>,
    /// Documents swapped in by successive reloads.
    reloads: Mutex<VecDeque<String>>,
    clicks: Mutex<Vec<String>>,
    reload_count: Mutex<usize>,
    /// Documents served by `goto`, keyed by URL.
    site: HashMap<String, String>,
}

impl SnapshotPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(url.into()),
            html: Mutex::new(html.into()),
            reloads: Mutex::new(VecDeque::new()),
            clicks: Mutex::new(Vec::new()),
            reload_count: Mutex::new(0),
            site: HashMap::new(),
        }
    }

    /// Serve `html` whenever the page navigates to `url`.
    pub fn serving(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.site.insert(url.into(), html.into());
        self
    }

    /// Serve `html` after the next reload.
    pub fn then_on_reload(self, html: impl Into<String>) -> Self {
        self.reloads.lock().push_back(html.into());
        self
    }

    /// Locators clicked so far, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().clone()
    }

    pub fn reload_count(&self) -> usize {
        *self.reload_count.lock()
    }

    fn with_document<T>(&self, f: impl FnOnce(&Html) -> Result<T, DomError>) -> Result<T, DomError> {
        let html = self.html.lock().clone();
        let document = Html::parse_document(&html);
        f(&document)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, DomError> {
    Selector::parse(selector)
        .map_err(|e| DomError::Backend(format!("invalid selector {:?}: {:?}", selector, e)))
}

/// Text held directly by an element, excluding its children.
fn own_text(element: &ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect()
}

fn label_matches(element: &ElementRef<'_>, text: &str, exact: bool) -> bool {
    let own = own_text(element);
    if exact {
        own.trim() == text.trim()
    } else {
        own.contains(text)
    }
}

fn resolve<'a>(document: &'a Html, locator: &Locator) -> Result<Vec<ElementRef<'a>>, DomError> {
    let mut current: Option<Vec<ElementRef<'a>>> = None;

    for step in locator.steps() {
        let next = match step {
            Step::Css(selector) => {
                let selector = parse_selector(selector)?;
                match current.take() {
                    None => document.select(&selector).collect(),
                    Some(scopes) => {
                        let mut seen = HashSet::new();
                        let mut found = Vec::new();
                        for scope in scopes {
                            for element in scope.select(&selector) {
                                // `select` includes the scope itself; the DOM does not.
                                if element.id() != scope.id() && seen.insert(element.id()) {
                                    found.push(element);
                                }
                            }
                        }
                        found
                    }
                }
            }
            Step::Nth(index) => {
                let scopes = current.take().unwrap_or_else(|| vec![document.root_element()]);
                scopes.into_iter().nth(*index).into_iter().collect()
            }
            Step::Last => {
                let scopes = current.take().unwrap_or_else(|| vec![document.root_element()]);
                scopes.into_iter().last().into_iter().collect()
            }
            Step::HasText { label, text, exact } => {
                let label = parse_selector(label)?;
                let scopes = current.take().unwrap_or_else(|| vec![document.root_element()]);
                scopes
                    .into_iter()
                    .filter(|scope| {
                        scope
                            .select(&label)
                            .any(|l| l.id() != scope.id() && label_matches(&l, text, *exact))
                    })
                    .collect()
            }
            Step::OwnText { text, exact } => {
                let scopes = current.take().unwrap_or_default();
                scopes
                    .into_iter()
                    .filter(|element| label_matches(element, text, *exact))
                    .collect()
            }
        };
        current = Some(next);
    }

    Ok(current.unwrap_or_default())
}

fn hides(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    value
        .attr("style")
        .map(|style| {
            let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            let style = style.to_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        })
        .unwrap_or(false)
}

fn is_visible(element: &ElementRef<'_>) -> bool {
    if hides(element) {
        return false;
    }
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| hides(&ancestor))
}

#[async_trait]
impl Page for SnapshotPage {
    async fn goto(&self, url: &str) -> Result<(), DomError> {
        *self.url.lock() = url.to_string();
        if let Some(html) = self.site.get(url) {
            *self.html.lock() = html.clone();
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), DomError> {
        *self.reload_count.lock() += 1;
        if let Some(next) = self.reloads.lock().pop_front() {
            *self.html.lock() = next;
        }
        Ok(())
    }

    async fn url(&self) -> Result<String, DomError> {
        Ok(self.url.lock().clone())
    }

    async fn title(&self) -> Result<String, DomError> {
        self.with_document(|doc| {
            let selector = parse_selector("title")?;
            Ok(doc
                .select(&selector)
                .next()
                .map(|t| t.text().collect::<String>())
                .unwrap_or_default())
        })
    }

    async fn set_viewport(&self, _width: u32, _height: u32) -> Result<(), DomError> {
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize, DomError> {
        self.with_document(|doc| Ok(resolve(doc, locator)?.len()))
    }

    async fn state(&self, locator: &Locator) -> Result<ElementState, DomError> {
        self.with_document(|doc| {
            Ok(match resolve(doc, locator)?.first() {
                None => ElementState::Detached,
                Some(element) if is_visible(element) => ElementState::Visible,
                Some(_) => ElementState::Hidden,
            })
        })
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, DomError> {
        self.with_document(|doc| {
            Ok(resolve(doc, locator)?
                .first()
                .map(|element| element.text().collect::<String>()))
        })
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DomError> {
        self.with_document(|doc| {
            Ok(resolve(doc, locator)?
                .first()
                .and_then(|element| element.value().attr(name).map(str::to_string)))
        })
    }

    async fn click(&self, locator: &Locator) -> Result<(), DomError> {
        let found = self.count(locator).await?;
        if found == 0 {
            return Err(DomError::Missing(locator.to_string()));
        }
        self.clicks.lock().push(locator.to_string());
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), DomError> {
        if self.count(locator).await? == 0 {
            return Err(DomError::Missing(locator.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><head><title> Premier League </title></head><body>
          <div class="market"><span>Total goals</span><button>1.90</button></div>
          <div class="market"><span>Handicap</span><button>2.05</button></div>
          <div class="market" style="display: none"><span>Total corners</span></div>
          <div hidden><p id="deep">x</p></div>
        </body></html>"#;

    #[tokio::test]
    async fn test_count_and_nth() {
        let page = SnapshotPage::new("https://example.com", HTML);
        let markets = Locator::css("div.market");
        assert_eq!(page.count(&markets).await.unwrap(), 3);
        let text = page.text_content(&markets.nth(1).locate("button")).await.unwrap();
        assert_eq!(text.as_deref(), Some("2.05"));
    }

    #[tokio::test]
    async fn test_has_text_uses_own_label_text() {
        let page = SnapshotPage::new("https://example.com", HTML);
        let total = Locator::css("div.market").has_text("span", "Total");
        assert_eq!(page.count(&total).await.unwrap(), 2);
        let exact = Locator::css("div.market").has_exact_text("span", "Total");
        assert_eq!(page.count(&exact).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_visibility_follows_ancestors() {
        let page = SnapshotPage::new("https://example.com", HTML);
        let hidden = Locator::css("div.market").has_text("span", "corners");
        assert_eq!(page.state(&hidden).await.unwrap(), ElementState::Hidden);
        assert_eq!(page.state(&Locator::css("#deep")).await.unwrap(), ElementState::Hidden);
        assert_eq!(page.state(&Locator::css("#nope")).await.unwrap(), ElementState::Detached);
        assert_eq!(
            page.state(&Locator::css("div.market").first()).await.unwrap(),
            ElementState::Visible
        );
    }

    #[tokio::test]
    async fn test_scoped_select_excludes_scope() {
        let page = SnapshotPage::new("https://example.com", "<div class='a'><div class='a'>x</div></div>");
        let nested = Locator::css("div.a").first().locate("div.a");
        assert_eq!(page.count(&nested).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reload_swaps_document() {
        let page = SnapshotPage::new("https://example.com", "<p>old</p>").then_on_reload("<p>new</p>");
        page.reload().await.unwrap();
        let text = page.text_content(&Locator::css("p")).await.unwrap();
        assert_eq!(text.as_deref(), Some("new"));
        assert_eq!(page.reload_count(), 1);
    }

    #[tokio::test]
    async fn test_click_missing_element_errors() {
        let page = SnapshotPage::new("https://example.com", HTML);
        assert!(matches!(
            page.click(&Locator::css("a.none")).await,
            Err(DomError::Missing(_))
        ));
        page.click(&Locator::css("div.market").first()).await.unwrap();
        assert_eq!(page.clicks().len(), 1);
    }

    #[tokio::test]
    async fn test_own_text_filter() {
        let page = SnapshotPage::new(
            "https://example.com",
            "<div class='tab'>Match</div><div class='tab'>1st half</div><span>See more</span>",
        );
        let tab = Locator::css("div.tab").with_text("1st half");
        assert_eq!(page.count(&tab).await.unwrap(), 1);
        let more = Locator::css("span").with_exact_text("See more");
        assert_eq!(page.count(&more).await.unwrap(), 1);
    }
}
