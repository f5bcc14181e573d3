//! A script-free [`Page`] backed by plain HTTP and an HTML parser.
//!
//! This is the deterministic driver used against mock servers; real sites go
//! through [`BrowserPage`](crate::browser::BrowserPage). No scripts run and
//! stylesheets are ignored. Documents are fetched with `reqwest`, queried
//! with `scraper`, visibility is judged from markup alone, and a submit
//! click applies email constraint validation before sending the form.

use crate::error::{Result, ScanError};
use crate::http::build_client;
use crate::page::{ElementHandle, Locator, NavigationResponse, Page, WaitUntil};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use reqwest::{Client, RequestBuilder};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Valid e-mail address as defined for `<input type="email">`.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap()
});

const NEVER_RENDERED: &[&str] = &["head", "title", "script", "style", "template", "noscript"];
const REPLACED: &[&str] = &[
    "input", "button", "select", "textarea", "img", "iframe", "video", "svg", "canvas", "object",
];

struct LoadedDocument {
    id: u64,
    url: Url,
    html: String,
    /// Values typed into controls, keyed by element index.
    values: HashMap<usize, String>,
}

impl LoadedDocument {
    fn blank() -> Self {
        Self {
            id: 0,
            url: Url::parse("about:blank").expect("about:blank is a valid URL"),
            html: String::new(),
            values: HashMap::new(),
        }
    }
}

pub struct StaticPage {
    client: Client,
    document: Mutex<LoadedDocument>,
    next_document: AtomicU64,
}

impl StaticPage {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            document: Mutex::new(LoadedDocument::blank()),
            next_document: AtomicU64::new(1),
        }
    }

    /// Replace the current document with literal markup, as if it had been
    /// served from `url`.
    pub async fn set_content(&self, url: &str, html: &str) -> Result<()> {
        let url = parse_url(url)?;
        self.install(url, html.to_string()).await;
        Ok(())
    }

    async fn install(&self, url: Url, html: String) -> u64 {
        let id = self.next_document.fetch_add(1, Ordering::Relaxed);
        let mut document = self.document.lock().await;
        *document = LoadedDocument {
            id,
            url,
            html,
            values: HashMap::new(),
        };
        id
    }

    async fn load(
        &self,
        request: RequestBuilder,
        requested: &str,
        timeout: Duration,
    ) -> Result<NavigationResponse> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| navigation_error(requested, timeout, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .map_err(|e| navigation_error(requested, timeout, e))?;

        debug!("Loaded {} ({}, {} bytes)", final_url, status, body.len());
        let navigation = NavigationResponse {
            url: final_url.to_string(),
            status,
            content_type,
        };
        self.install(final_url, body).await;
        Ok(navigation)
    }

    async fn inspect<T>(&self, f: impl FnOnce(&Dom<'_>, &LoadedDocument) -> Result<T>) -> Result<T> {
        let document = self.document.lock().await;
        let html = Html::parse_document(&document.html);
        let dom = Dom::new(&html, document.id);
        f(&dom, &document)
    }
}

#[async_trait]
impl Page for StaticPage {
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<NavigationResponse>> {
        let target = parse_url(url)?;
        debug!("Navigating to {} (wait until {:?})", target, wait_until);

        {
            let mut document = self.document.lock().await;
            if is_same_document(&document.url, &target) {
                document.url = target;
                return Ok(None);
            }
        }

        let request = self.client.get(target.clone());
        let navigation = self.load(request, url, timeout).await?;
        Ok(Some(navigation))
    }

    async fn current_url(&self) -> Option<String> {
        let document = self.document.lock().await;
        Some(document.url.to_string())
    }

    async fn title(&self) -> Result<Option<String>> {
        self.inspect(|dom, _| {
            let selector = css("title")?;
            Ok(dom
                .html
                .select(&selector)
                .next()
                .map(|title| title.text().collect::<String>().trim().to_string()))
        })
        .await
    }

    async fn anchor_hrefs(&self) -> Result<Vec<String>> {
        self.inspect(|dom, _| {
            let selector = css("a[href]")?;
            Ok(dom
                .html
                .select(&selector)
                .filter_map(|a| a.value().attr("href"))
                .map(|href| href.to_string())
                .collect())
        })
        .await
    }

    async fn query_first(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        self.inspect(|dom, _| {
            let matches = dom.resolve(locator)?;
            Ok(matches.first().map(|&index| ElementHandle::new(dom.document, index)))
        })
        .await
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.inspect(|dom, _| Ok(dom.resolve(locator)?.len())).await
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool> {
        self.inspect(|dom, _| {
            let el = dom.element(element)?;
            Ok(is_rendered(el) && has_box(el))
        })
        .await
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>> {
        self.inspect(|dom, _| {
            let el = dom.element(element)?;
            Ok(Some(el.text().collect::<String>()))
        })
        .await
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.inspect(|dom, _| {
            let el = dom.element(element)?;
            Ok(el.value().attr(name).map(|v| v.to_string()))
        })
        .await
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()> {
        let index = self
            .inspect(|dom, _| {
                let el = dom.element(element)?;
                if !is_fillable(el) {
                    return Err(ScanError::Other(format!(
                        "<{}> element cannot be filled",
                        el.value().name()
                    )));
                }
                Ok(element.index)
            })
            .await?;

        let mut document = self.document.lock().await;
        if document.id != element.document {
            return Err(ScanError::StaleElement);
        }
        document.values.insert(index, value.to_string());
        Ok(())
    }

    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<()> {
        let action = self
            .inspect(|dom, document| {
                let el = dom.element(element)?;
                if !(is_rendered(el) && has_box(el)) || is_disabled(el) {
                    return Err(ScanError::Timeout(timeout));
                }
                Ok(dom.click_action(element.index, &document.url, &document.values))
            })
            .await?;

        match action {
            ClickAction::Nothing => Ok(()),
            ClickAction::Blocked => {
                debug!("Form submission blocked by constraint validation");
                Ok(())
            }
            ClickAction::Navigate(target) => {
                let request = self.client.get(target.clone());
                self.load(request, target.as_str(), timeout).await?;
                Ok(())
            }
            ClickAction::Submit(submission) => {
                info!(
                    "Submitting form: {} {} ({} fields)",
                    submission.method.as_str(),
                    submission.action,
                    submission.fields.len()
                );
                let request = match submission.method {
                    FormMethod::Get => {
                        let mut target = submission.action.clone();
                        if submission.fields.is_empty() {
                            target.set_query(None);
                        } else {
                            target
                                .query_pairs_mut()
                                .clear()
                                .extend_pairs(submission.fields.iter());
                        }
                        self.client.get(target)
                    }
                    FormMethod::Post => self
                        .client
                        .post(submission.action.clone())
                        .form(&submission.fields),
                };
                self.load(request, submission.action.as_str(), timeout).await?;
                Ok(())
            }
        }
    }

    async fn check_validity(&self, element: &ElementHandle) -> Result<bool> {
        self.inspect(|dom, document| {
            let el = dom.element(element)?;
            if el.value().name() == "form" {
                Ok(dom.form_valid(element.index, &document.values))
            } else {
                Ok(dom.field_valid(element.index, &document.values))
            }
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormMethod {
    Get,
    Post,
}

impl FormMethod {
    fn as_str(&self) -> &'static str {
        match self {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
        }
    }
}

#[derive(Debug)]
struct FormSubmission {
    method: FormMethod,
    action: Url,
    fields: Vec<(String, String)>,
}

#[derive(Debug)]
enum ClickAction {
    Nothing,
    Blocked,
    Navigate(Url),
    Submit(FormSubmission),
}

/// One parsed document with its elements numbered in document order.
struct Dom<'a> {
    html: &'a Html,
    elements: Vec<ElementRef<'a>>,
    document: u64,
}

impl<'a> Dom<'a> {
    fn new(html: &'a Html, document: u64) -> Self {
        let elements = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();
        Self {
            html,
            elements,
            document,
        }
    }

    fn element(&self, handle: &ElementHandle) -> Result<ElementRef<'a>> {
        if handle.document != self.document {
            return Err(ScanError::StaleElement);
        }
        self.elements
            .get(handle.index)
            .copied()
            .ok_or(ScanError::StaleElement)
    }

    fn index_of(&self, el: ElementRef<'a>) -> Option<usize> {
        self.elements.iter().position(|e| e.id() == el.id())
    }

    fn resolve(&self, locator: &Locator) -> Result<Vec<usize>> {
        match locator {
            Locator::Css(selector) => {
                let selector = css(selector)?;
                Ok(self
                    .html
                    .select(&selector)
                    .filter_map(|el| self.index_of(el))
                    .collect())
            }
            Locator::Text(pattern) => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ScanError::InvalidSelector(format!("text=/{}/: {}", pattern, e)))?;
                Ok(self
                    .elements
                    .iter()
                    .enumerate()
                    .filter(|(_, el)| !NEVER_RENDERED.contains(&el.value().name()))
                    .filter(|(_, el)| re.is_match(&own_text(**el)))
                    .map(|(index, _)| index)
                    .collect())
            }
            Locator::Containing { outer, inner } => {
                let outer = css(outer)?;
                let inner = css(inner)?;
                Ok(self
                    .html
                    .select(&outer)
                    .filter(|el| el.select(&inner).next().is_some())
                    .filter_map(|el| self.index_of(el))
                    .collect())
            }
            Locator::Within { scope, inner } => {
                let Some(&scope) = self.resolve(scope)?.first() else {
                    return Ok(Vec::new());
                };
                let scope_id = self.elements[scope].id();
                Ok(self
                    .resolve(inner)?
                    .into_iter()
                    .filter(|&index| {
                        self.elements[index]
                            .ancestors()
                            .any(|node| node.id() == scope_id)
                    })
                    .collect())
            }
            Locator::AnyOf(locators) => {
                for candidate in locators {
                    let matches = self.resolve(candidate)?;
                    if !matches.is_empty() {
                        return Ok(matches);
                    }
                }
                Ok(Vec::new())
            }
        }
    }

    fn value_of(&self, index: usize, values: &HashMap<usize, String>) -> String {
        if let Some(value) = values.get(&index) {
            return value.clone();
        }
        let el = self.elements[index];
        match el.value().name() {
            "textarea" => el.text().collect(),
            "select" => selected_option(el).unwrap_or_default(),
            _ => el.value().attr("value").unwrap_or_default().to_string(),
        }
    }

    /// The form a control belongs to: its `form` attribute, else the nearest
    /// enclosing `<form>`.
    fn owner_form(&self, index: usize) -> Option<usize> {
        let el = self.elements[index];
        if let Some(form_id) = el.value().attr("form") {
            return self.elements.iter().position(|e| {
                e.value().name() == "form" && e.value().attr("id") == Some(form_id)
            });
        }
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "form")
            .and_then(|form| self.index_of(form))
    }

    fn controls_of(&self, form_index: usize) -> Vec<usize> {
        (0..self.elements.len())
            .filter(|&i| {
                matches!(
                    self.elements[i].value().name(),
                    "input" | "textarea" | "select" | "button"
                )
            })
            .filter(|&i| self.owner_form(i) == Some(form_index))
            .collect()
    }

    fn field_valid(&self, index: usize, values: &HashMap<usize, String>) -> bool {
        let el = self.elements[index];
        let tag = el.value().name();
        if !matches!(tag, "input" | "textarea" | "select") || is_disabled(el) {
            return true;
        }

        let required = el.value().attr("required").is_some();
        if tag == "select" {
            return !(required && self.value_of(index, values).is_empty());
        }
        if el.value().attr("readonly").is_some() {
            return true;
        }

        let kind = input_type(el);
        match kind.as_str() {
            "hidden" | "submit" | "image" | "reset" | "button" | "file" => return true,
            "checkbox" | "radio" => return !(required && el.value().attr("checked").is_none()),
            _ => {}
        }

        let value = sanitize(&kind, &self.value_of(index, values));
        if value.is_empty() {
            return !required;
        }

        let well_formed = match kind.as_str() {
            "email" => {
                if el.value().attr("multiple").is_some() {
                    value.split(',').all(|part| EMAIL_RE.is_match(part.trim()))
                } else {
                    EMAIL_RE.is_match(&value)
                }
            }
            "url" => Url::parse(&value).is_ok(),
            "number" | "range" => value.parse::<f64>().is_ok(),
            _ => true,
        };
        if !well_formed {
            return false;
        }

        let length = value.chars().count();
        let min_ok = numeric_attr(el, "minlength").is_none_or(|min| length >= min);
        let max_ok = numeric_attr(el, "maxlength").is_none_or(|max| length <= max);
        if !(min_ok && max_ok) {
            return false;
        }

        match el.value().attr("pattern") {
            Some(pattern) if tag == "input" => match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => re.is_match(&value),
                Err(_) => true,
            },
            _ => true,
        }
    }

    fn form_valid(&self, form_index: usize, values: &HashMap<usize, String>) -> bool {
        self.controls_of(form_index)
            .into_iter()
            .all(|i| self.field_valid(i, values))
    }

    fn click_action(&self, index: usize, base: &Url, values: &HashMap<usize, String>) -> ClickAction {
        let el = self.elements[index];
        let tag = el.value().name();

        if tag == "a" {
            return match el.value().attr("href").and_then(|href| base.join(href).ok()) {
                Some(target) if is_http(&target) && !is_same_document(base, &target) => {
                    ClickAction::Navigate(target)
                }
                _ => ClickAction::Nothing,
            };
        }

        if !is_submit_control(el) {
            return ClickAction::Nothing;
        }
        let Some(form_index) = self.owner_form(index) else {
            return ClickAction::Nothing;
        };
        let form = self.elements[form_index];

        let skip_validation = form.value().attr("novalidate").is_some()
            || el.value().attr("formnovalidate").is_some();
        if !skip_validation && !self.form_valid(form_index, values) {
            return ClickAction::Blocked;
        }

        let method = el
            .value()
            .attr("formmethod")
            .or_else(|| form.value().attr("method"))
            .map(|m| m.trim().to_ascii_lowercase());
        let method = match method.as_deref() {
            Some("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };

        let action = el
            .value()
            .attr("formaction")
            .or_else(|| form.value().attr("action"))
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let action = match action {
            Some(action) => match base.join(action) {
                Ok(url) => url,
                Err(_) => return ClickAction::Nothing,
            },
            None => base.clone(),
        };
        if !is_http(&action) {
            return ClickAction::Nothing;
        }

        ClickAction::Submit(FormSubmission {
            method,
            action,
            fields: self.entry_list(form_index, index, values),
        })
    }

    /// Name/value pairs a browser would submit for `form_index` when
    /// `submitter` is clicked.
    fn entry_list(
        &self,
        form_index: usize,
        submitter: usize,
        values: &HashMap<usize, String>,
    ) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        for i in self.controls_of(form_index) {
            let el = self.elements[i];
            let Some(name) = el.value().attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            if is_disabled(el) {
                continue;
            }
            let value = match el.value().name() {
                "button" => {
                    if i != submitter {
                        continue;
                    }
                    el.value().attr("value").unwrap_or_default().to_string()
                }
                "input" => match input_type(el).as_str() {
                    "submit" | "image" => {
                        if i != submitter {
                            continue;
                        }
                        el.value().attr("value").unwrap_or_default().to_string()
                    }
                    "reset" | "button" | "file" => continue,
                    "checkbox" | "radio" => {
                        if el.value().attr("checked").is_none() {
                            continue;
                        }
                        el.value().attr("value").unwrap_or("on").to_string()
                    }
                    kind => sanitize(kind, &self.value_of(i, values)),
                },
                _ => self.value_of(i, values),
            };
            fields.push((name.to_string(), value));
        }
        fields
    }
}

fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScanError::InvalidSelector(format!("{}: {}", selector, e)))
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))
}

fn navigation_error(url: &str, timeout: Duration, e: reqwest::Error) -> ScanError {
    if e.is_timeout() {
        ScanError::Timeout(timeout)
    } else {
        ScanError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// A navigation that only changes the fragment stays in the same document
/// and yields no response.
fn is_same_document(current: &Url, target: &Url) -> bool {
    if target.fragment().is_none() || !is_http(current) {
        return false;
    }
    let mut a = current.clone();
    let mut b = target.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

fn input_type(el: ElementRef<'_>) -> String {
    el.value()
        .attr("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "text".to_string())
}

fn is_submit_control(el: ElementRef<'_>) -> bool {
    match el.value().name() {
        "input" => matches!(input_type(el).as_str(), "submit" | "image"),
        "button" => matches!(
            el.value().attr("type").map(|t| t.trim().to_ascii_lowercase()).as_deref(),
            None | Some("submit") | Some("")
        ),
        _ => false,
    }
}

fn is_fillable(el: ElementRef<'_>) -> bool {
    match el.value().name() {
        "textarea" => true,
        "input" => !matches!(
            input_type(el).as_str(),
            "submit" | "image" | "reset" | "button" | "checkbox" | "radio" | "file" | "hidden"
        ),
        _ => false,
    }
}

fn is_disabled(el: ElementRef<'_>) -> bool {
    el.value().attr("disabled").is_some()
}

fn numeric_attr(el: ElementRef<'_>, name: &str) -> Option<usize> {
    el.value().attr(name).and_then(|v| v.trim().parse().ok())
}

/// Value sanitization applied by the browser before validation.
fn sanitize(kind: &str, value: &str) -> String {
    let stripped: String = value.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    match kind {
        "email" | "url" => stripped.trim().to_string(),
        _ => stripped,
    }
}

fn selected_option(select: ElementRef<'_>) -> Option<String> {
    let options: Vec<ElementRef<'_>> = select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "option")
        .collect();
    let chosen = options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())?;
    Some(
        chosen
            .value()
            .attr("value")
            .map(|v| v.to_string())
            .unwrap_or_else(|| chosen.text().collect::<String>().trim().to_string()),
    )
}

/// Text of the element's own text children, excluding descendants.
fn own_text(el: ElementRef<'_>) -> String {
    let mut text = String::new();
    for child in el.children() {
        if let Some(t) = child.value().as_text() {
            text.push_str(&t.text);
        }
    }
    text
}

/// Whether markup alone hides the element or one of its ancestors.
fn is_rendered(el: ElementRef<'_>) -> bool {
    if el.value().name() == "input" && input_type(el) == "hidden" {
        return false;
    }
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|e| {
            let value = e.value();
            if NEVER_RENDERED.contains(&value.name()) {
                return false;
            }
            if value.name() == "dialog" && value.attr("open").is_none() {
                return false;
            }
            if value.attr("hidden").is_some() {
                return false;
            }
            if value.attr("aria-hidden").map(|v| v.trim().eq_ignore_ascii_case("true")) == Some(true) {
                return false;
            }
            match value.attr("style") {
                Some(style) => {
                    let style: String = style
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect::<String>()
                        .to_ascii_lowercase();
                    !(style.contains("display:none") || style.contains("visibility:hidden"))
                }
                None => true,
            }
        })
}

/// An element with no text and no replaced content renders as an empty box.
fn has_box(el: ElementRef<'_>) -> bool {
    if REPLACED.contains(&el.value().name()) {
        return true;
    }
    if !el.text().collect::<String>().trim().is_empty() {
        return true;
    }
    el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| REPLACED.contains(&d.value().name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASE: &str = "https://example.com/";

    async fn page_with(html: &str) -> StaticPage {
        let page = StaticPage::with_client(Client::new());
        page.set_content(BASE, html).await.unwrap();
        page
    }

    async fn first(page: &StaticPage, locator: &Locator) -> ElementHandle {
        page.query_first(locator).await.unwrap().expect("element present")
    }

    #[tokio::test]
    async fn test_css_locator_takes_first_match() {
        let page = page_with(
            r#"<form><input type="text" name="a"><input type="email" name="first"><input type="email" name="second"></form>"#,
        )
        .await;

        let handle = first(&page, &Locator::css(r#"input[type="email"]"#)).await;
        assert_eq!(
            page.attribute(&handle, "name").await.unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            page.count(&Locator::css(r#"input[type="email"]"#)).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_containing_locator_finds_form_with_email_input() {
        let page = page_with(
            r#"<form id="search"><input type="search"></form>
               <form id="newsletter"><input type="email"></form>"#,
        )
        .await;

        let handle = first(&page, &Locator::containing("form", r#"input[type="email"]"#)).await;
        assert_eq!(
            page.attribute(&handle, "id").await.unwrap().as_deref(),
            Some("newsletter")
        );
    }

    #[tokio::test]
    async fn test_within_locator_is_scoped_to_first_scope_match() {
        let page = page_with(
            r#"<form id="search"><input type="search"><button type="submit" name="go">Go</button></form>
               <form id="newsletter"><input type="email"><button type="submit" name="join">Join</button></form>"#,
        )
        .await;

        let locator = Locator::within(
            Locator::containing("form", r#"input[type="email"]"#),
            Locator::css(r#"button[type="submit"]"#),
        );
        let handle = first(&page, &locator).await;
        assert_eq!(
            page.attribute(&handle, "name").await.unwrap().as_deref(),
            Some("join")
        );
        assert_eq!(page.count(&locator).await.unwrap(), 1);

        let missing_scope = Locator::within(Locator::css("#nowhere"), Locator::css("button"));
        assert!(page.query_first(&missing_scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_text_locator_is_case_insensitive_on_own_text() {
        let page = page_with(
            r#"<section><p>Welcome</p><div class="note">THANK you for subscribing</div></section>"#,
        )
        .await;

        let handle = first(&page, &Locator::text("thank|success|subscribed")).await;
        assert_eq!(
            page.attribute(&handle, "class").await.unwrap().as_deref(),
            Some("note")
        );
    }

    #[tokio::test]
    async fn test_text_locator_ignores_scripts() {
        let page = page_with(r#"<script>var success = true;</script><p>Hello</p>"#).await;
        assert!(page.query_first(&Locator::text("success")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_any_of_prefers_earlier_pattern() {
        let page = page_with(
            r#"<div data-error="x">late pattern, early in document</div><p class="form-error">early pattern</p>"#,
        )
        .await;

        let locator = Locator::any_of([Locator::css(".form-error"), Locator::css("[data-error]")]);
        let handle = first(&page, &locator).await;
        assert_eq!(
            page.attribute(&handle, "class").await.unwrap().as_deref(),
            Some("form-error")
        );
    }

    #[tokio::test]
    async fn test_invalid_selector_is_error() {
        let page = page_with("<p>x</p>").await;
        assert!(matches!(
            page.query_first(&Locator::css("input[[")).await,
            Err(ScanError::InvalidSelector(_))
        ));
        assert!(matches!(
            page.query_first(&Locator::text("(")).await,
            Err(ScanError::InvalidSelector(_))
        ));
    }

    #[tokio::test]
    async fn test_visibility_rules() {
        let page = page_with(
            r#"<div id="shown">Visible</div>
               <div id="attr" hidden>Hidden</div>
               <div style="display: none"><span id="nested">Inside</span></div>
               <div id="invisible" style="visibility:hidden">Invisible</div>
               <div id="aria" aria-hidden="true">Aria</div>
               <div id="empty" class="error-message"></div>
               <input id="hidden-input" type="hidden" value="x">
               <template><p id="tpl">Template</p></template>"#,
        )
        .await;

        let visible = |id: &'static str| {
            let page = &page;
            async move {
                let handle = page.query_first(&Locator::css(format!("#{}", id))).await.unwrap();
                match handle {
                    Some(h) => page.is_visible(&h).await.unwrap(),
                    None => false,
                }
            }
        };

        assert!(visible("shown").await);
        assert!(!visible("attr").await);
        assert!(!visible("nested").await);
        assert!(!visible("invisible").await);
        assert!(!visible("aria").await);
        assert!(!visible("empty").await);
        assert!(!visible("hidden-input").await);
        assert!(!visible("tpl").await);
        assert!(!page.is_locator_visible(&Locator::css("#missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_email_validity() {
        let page = page_with(r#"<form><input type="email" required></form>"#).await;
        let input = first(&page, &Locator::css("input")).await;

        for (value, expected) in [
            ("", false),
            ("invalid-email", false),
            ("user@", false),
            ("@domain.com", false),
            ("user name@domain.com", false),
            ("test@example.com", true),
            ("test.user+label@domain.com", true),
            ("  padded@example.com  ", true),
            ("user@domain", true),
        ] {
            page.fill(&input, value).await.unwrap();
            assert_eq!(
                page.check_validity(&input).await.unwrap(),
                expected,
                "validity of {:?}",
                value
            );
        }
    }

    #[tokio::test]
    async fn test_optional_empty_field_is_valid() {
        let page = page_with(r#"<input type="email">"#).await;
        let input = first(&page, &Locator::css("input")).await;
        assert!(page.check_validity(&input).await.unwrap());
    }

    #[tokio::test]
    async fn test_pattern_and_length_constraints() {
        let page = page_with(
            r#"<input id="zip" pattern="[0-9]{5}"><input id="name" minlength="3" maxlength="5">"#,
        )
        .await;
        let zip = first(&page, &Locator::css("#zip")).await;
        let name = first(&page, &Locator::css("#name")).await;

        page.fill(&zip, "1234a").await.unwrap();
        assert!(!page.check_validity(&zip).await.unwrap());
        page.fill(&zip, "12345").await.unwrap();
        assert!(page.check_validity(&zip).await.unwrap());

        page.fill(&name, "ab").await.unwrap();
        assert!(!page.check_validity(&name).await.unwrap());
        page.fill(&name, "abcd").await.unwrap();
        assert!(page.check_validity(&name).await.unwrap());
        page.fill(&name, "abcdef").await.unwrap();
        assert!(!page.check_validity(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_fill_rejects_buttons() {
        let page = page_with(r#"<button type="submit">Go</button>"#).await;
        let button = first(&page, &Locator::css("button")).await;
        assert!(page.fill(&button, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_handles_go_stale_after_navigation() {
        let page = page_with(r#"<p id="x">one</p>"#).await;
        let handle = first(&page, &Locator::css("#x")).await;
        page.set_content(BASE, r#"<p id="x">two</p>"#).await.unwrap();
        assert!(matches!(
            page.text_content(&handle).await,
            Err(ScanError::StaleElement)
        ));
    }

    #[tokio::test]
    async fn test_goto_records_status_and_title() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><head><title> Pricing </title></head><body></body></html>",
                    "text/html",
                ),
            )
            .mount(&mock_server)
            .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/pricing", mock_server.uri());
        let response = page
            .goto(&url, WaitUntil::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("response");

        assert_eq!(response.status, 200);
        assert!(response.content_type.unwrap_or_default().starts_with("text/html"));
        assert_eq!(page.title().await.unwrap().as_deref(), Some("Pricing"));
        assert_eq!(page.current_url().await.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_goto_fragment_only_yields_no_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>home</p>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let page = StaticPage::new(Duration::from_secs(5)).unwrap();
        let home = format!("{}/", mock_server.uri());
        assert!(page
            .goto(&home, WaitUntil::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap()
            .is_some());
        assert!(page
            .goto(&format!("{}#top", home), WaitUntil::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_goto_connection_failure_is_error() {
        let page = StaticPage::new(Duration::from_secs(2)).unwrap();
        let result = page
            .goto("http://127.0.0.1:1/", WaitUntil::DomContentLoaded, Duration::from_secs(2))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_submission_is_not_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Thanks!</p>"))
            .expect(0)
            .mount(&mock_server)
            .await;

        let page = StaticPage::with_client(Client::new());
        page.set_content(
            &format!("{}/", mock_server.uri()),
            r#"<form method="post" action="/subscribe">
                 <input type="email" name="email" required>
                 <button type="submit">Subscribe</button>
               </form>"#,
        )
        .await
        .unwrap();

        let input = first(&page, &Locator::css("input")).await;
        page.fill(&input, "invalid-email").await.unwrap();
        let button = first(&page, &Locator::css("button")).await;
        page.click(&button, Duration::from_secs(5)).await.unwrap();

        // Still on the form page.
        assert!(page.query_first(&Locator::css("form")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_valid_post_submission_loads_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .and(body_string_contains("email=test.user%2Blabel%40domain.com"))
            .and(body_string_contains("source=footer"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<p class="done">Thanks for subscribing!</p>"#, "text/html"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let page = StaticPage::with_client(Client::new());
        page.set_content(
            &format!("{}/", mock_server.uri()),
            r#"<form method="POST" action="/subscribe">
                 <input type="hidden" name="source" value="footer">
                 <input type="email" name="email" required>
                 <input type="submit" value="Join">
               </form>"#,
        )
        .await
        .unwrap();

        let input = first(&page, &Locator::css("input[type=email]")).await;
        page.fill(&input, "test.user+label@domain.com").await.unwrap();
        let submit = first(&page, &Locator::css("input[type=submit]")).await;
        page.click(&submit, Duration::from_secs(5)).await.unwrap();

        assert!(page.is_locator_visible(&Locator::text("thank")).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_submission_uses_query_string() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Results</p>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let page = StaticPage::with_client(Client::new());
        page.set_content(
            &format!("{}/", mock_server.uri()),
            r#"<form action="/search"><input name="q"><button>Go</button></form>"#,
        )
        .await
        .unwrap();

        let input = first(&page, &Locator::css("input")).await;
        page.fill(&input, "rust").await.unwrap();
        let button = first(&page, &Locator::css("button")).await;
        page.click(&button, Duration::from_secs(5)).await.unwrap();

        assert!(page.is_locator_visible(&Locator::text("results")).await.unwrap());
    }

    #[tokio::test]
    async fn test_novalidate_form_submits_anyway() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<p class="form-error">Please enter a valid email</p>"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let page = StaticPage::with_client(Client::new());
        page.set_content(
            &format!("{}/", mock_server.uri()),
            r#"<form method="post" action="/subscribe" novalidate>
                 <input type="email" name="email" required>
                 <button type="submit">Subscribe</button>
               </form>"#,
        )
        .await
        .unwrap();

        let button = first(&page, &Locator::css("button")).await;
        page.click(&button, Duration::from_secs(5)).await.unwrap();
        assert!(page.is_locator_visible(&Locator::css(".form-error")).await.unwrap());
    }

    #[tokio::test]
    async fn test_clicking_hidden_control_times_out() {
        let page = page_with(r#"<form><button type="submit" hidden>Go</button></form>"#).await;
        let button = first(&page, &Locator::css("button")).await;
        assert!(matches!(
            page.click(&button, Duration::from_millis(10)).await,
            Err(ScanError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_anchor_hrefs_in_document_order() {
        let page = page_with(
            r##"<a href="/a">A</a><a>no href</a><a href="#top">Top</a><a href="mailto:x@y.z">Mail</a>"##,
        )
        .await;
        assert_eq!(
            page.anchor_hrefs().await.unwrap(),
            vec!["/a", "#top", "mailto:x@y.z"]
        );
    }
}
