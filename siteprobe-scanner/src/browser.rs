//! A [`Page`] driven through headless Chromium over the DevTools protocol.
//!
//! [`BrowserSession`] owns the browser process and its event loop; every
//! [`BrowserPage`] is one tab. Locators are resolved by a small script
//! evaluated in the tab, so visibility comes from computed style and layout,
//! validity from the element's own `checkValidity()`, and clicks are real
//! mouse events dispatched by the browser.

use crate::error::{Result, ScanError};
use crate::page::{ElementHandle, Locator, NavigationResponse, Page, WaitUntil};
use crate::wait::DEFAULT_POLL_INTERVAL;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// How the browser process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Chrome's sandbox. Containers running as root usually need it off.
    pub sandbox: bool,
    /// Chrome or Chromium binary; detected from the usual locations when unset.
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            executable: None,
            window_width: 1280,
            window_height: 800,
        }
    }
}

impl BrowserOptions {
    fn to_config(&self, request_timeout: Duration) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .window_size(self.window_width, self.window_height);
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref executable) = self.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(ScanError::BrowserLaunch)
    }
}

pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl BrowserSession {
    /// Start the browser. `timeout` bounds every protocol request and is the
    /// longest a page waits for a document to settle.
    pub async fn launch(options: &BrowserOptions, timeout: Duration) -> Result<Self> {
        let config = options.to_config(timeout)?;
        info!(
            "Launching {} browser",
            if options.headless { "headless" } else { "headed" }
        );
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            timeout,
        })
    }

    /// Open a fresh tab on `about:blank`.
    pub async fn new_page(&self) -> Result<BrowserPage> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(BrowserPage::new(page, self.timeout))
    }

    pub async fn close(&mut self) -> Result<()> {
        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            debug!("Browser did not exit cleanly: {}", e);
        }
        self.handler.abort();
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// One browser tab.
pub struct BrowserPage {
    page: chromiumoxide::Page,
    next_document: AtomicU64,
    timeout: Duration,
}

/// Operations understood by [`DOM_SCRIPT`].
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Call<'a> {
    Install { candidate: u64 },
    Ready,
    Navigation,
    Title,
    Hrefs,
    Query { doc: u64, locator: &'a Locator },
    Count { locator: &'a Locator },
    Visible { handle: &'a ElementHandle },
    Text { handle: &'a ElementHandle },
    Attribute { handle: &'a ElementHandle, name: &'a str },
    Validity { handle: &'a ElementHandle },
    Clear { handle: &'a ElementHandle },
    Commit { handle: &'a ElementHandle },
    Mark { handle: &'a ElementHandle, token: &'a str },
    Unmark,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyState {
    doc: u64,
    state: String,
}

impl ReadyState {
    fn reached(&self, wait_until: WaitUntil) -> bool {
        match wait_until {
            WaitUntil::DomContentLoaded => self.state != "loading",
            WaitUntil::Load => self.state == "complete",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentInfo {
    url: String,
    status: u16,
    content_type: Option<String>,
}

const MARK_ATTRIBUTE: &str = "data-siteprobe-target";

/// Evaluated as `(DOM_SCRIPT)(call)`. Always answers with
/// `{ ok, value }` or `{ ok: false, kind, error }`.
const DOM_SCRIPT: &str = r#"(call) => {
  const SKIP = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD', 'TITLE'];
  const NOT_FILLABLE = ['button', 'submit', 'reset', 'image', 'checkbox', 'radio', 'file', 'hidden'];
  const state = () => window.__siteprobe;
  const done = (value) => ({ ok: true, value: value === undefined ? null : value });
  const fail = (kind, error) => ({ ok: false, kind, error: String(error) });
  const ownText = (el) => Array.from(el.childNodes)
    .filter((node) => node.nodeType === Node.TEXT_NODE)
    .map((node) => node.textContent)
    .join('');
  const resolve = (locator, root) => {
    switch (locator.kind) {
      case 'css':
        return Array.from(root.querySelectorAll(locator.value));
      case 'text': {
        const pattern = new RegExp(locator.value, 'i');
        return Array.from(root.querySelectorAll('*'))
          .filter((el) => !SKIP.includes(el.tagName) && pattern.test(ownText(el)));
      }
      case 'containing':
        return Array.from(root.querySelectorAll(locator.value.outer))
          .filter((el) => el.querySelector(locator.value.inner) !== null);
      case 'within': {
        const scope = resolve(locator.value.scope, root)[0];
        return scope ? resolve(locator.value.inner, scope) : [];
      }
      case 'any_of':
        for (const candidate of locator.value) {
          const hits = resolve(candidate, root);
          if (hits.length > 0) return hits;
        }
        return [];
      default:
        throw new Error('unknown locator ' + locator.kind);
    }
  };
  const element = (handle) => {
    const current = state();
    if (!current || current.doc !== handle.document) return null;
    const el = current.handles[handle.index];
    return el && el.isConnected ? el : null;
  };
  const visible = (el) => {
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.visibility === 'collapse') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  const setValue = (el, value) => {
    const descriptor = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
    if (descriptor && descriptor.set) descriptor.set.call(el, value);
    else el.value = value;
  };
  try {
    switch (call.op) {
      case 'install':
        if (!state()) window.__siteprobe = { doc: call.candidate, handles: [] };
        return done(state().doc);
      case 'ready':
        return done({ doc: state() ? state().doc : 0, state: document.readyState });
      case 'navigation': {
        const entry = performance.getEntriesByType('navigation')[0];
        return done({
          url: location.href,
          status: entry && entry.responseStatus ? entry.responseStatus : 0,
          content_type: document.contentType || null,
        });
      }
      case 'title':
        return done(document.title);
      case 'hrefs':
        return done(Array.from(document.querySelectorAll('a[href]'), (a) => a.getAttribute('href')));
      case 'count':
        return done(resolve(call.locator, document).length);
      case 'query': {
        const current = state();
        if (!current || current.doc !== call.doc) return fail('stale', 'document changed');
        const el = resolve(call.locator, document)[0];
        if (!el) return done(null);
        let index = current.handles.indexOf(el);
        if (index < 0) index = current.handles.push(el) - 1;
        return done(index);
      }
      case 'unmark':
        document.querySelectorAll('[data-siteprobe-target]')
          .forEach((el) => el.removeAttribute('data-siteprobe-target'));
        return done(true);
    }
    const el = element(call.handle);
    if (!el) return fail('stale', 'element is no longer attached');
    switch (call.op) {
      case 'visible':
        return done(visible(el));
      case 'text':
        return done(el.textContent);
      case 'attribute':
        return done(el.getAttribute(call.name));
      case 'validity':
        return done(typeof el.checkValidity === 'function' ? el.checkValidity() : true);
      case 'clear': {
        const fillable = (el.tagName === 'INPUT' && !NOT_FILLABLE.includes(el.type))
          || el.tagName === 'TEXTAREA'
          || el.isContentEditable;
        if (!fillable) return fail('script', '<' + el.tagName.toLowerCase() + '> element cannot be filled');
        el.focus();
        if (el.isContentEditable) el.textContent = '';
        else setValue(el, '');
        el.dispatchEvent(new Event('input', { bubbles: true }));
        return done(true);
      }
      case 'commit':
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return done(true);
      case 'mark':
        el.setAttribute('data-siteprobe-target', call.token);
        return done(true);
      default:
        return fail('script', 'unknown operation ' + call.op);
    }
  } catch (e) {
    const message = e && e.message ? e.message : e;
    return fail(e && e.name === 'SyntaxError' ? 'selector' : 'script', message);
  }
}"#;

impl BrowserPage {
    pub fn new(page: chromiumoxide::Page, timeout: Duration) -> Self {
        Self {
            page,
            next_document: AtomicU64::new(1),
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(&self, call: Call<'_>) -> Result<T> {
        let argument =
            serde_json::to_string(&call).map_err(|e| ScanError::Script(e.to_string()))?;
        let params = EvaluateParams::builder()
            .expression(format!("({})({})", DOM_SCRIPT, argument))
            .return_by_value(true)
            .build()
            .map_err(ScanError::Script)?;

        let reply: Reply = self
            .page
            .evaluate_expression(params)
            .await?
            .into_value()
            .map_err(|e| ScanError::Script(e.to_string()))?;

        if !reply.ok {
            let message = reply.error.unwrap_or_default();
            return Err(match reply.kind.as_deref() {
                Some("stale") => ScanError::StaleElement,
                Some("selector") => ScanError::InvalidSelector(message),
                _ => ScanError::Script(message),
            });
        }
        serde_json::from_value(reply.value).map_err(|e| ScanError::Script(e.to_string()))
    }

    /// Id of the document currently in the tab, numbering it on first sight.
    /// Protocol errors while a navigation swaps documents are retried until
    /// the page timeout.
    async fn current_document(&self) -> Result<u64> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let candidate = self.next_document.load(Ordering::Relaxed);
            match self.call::<u64>(Call::Install { candidate }).await {
                Ok(doc) => {
                    if doc == candidate {
                        self.next_document.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(doc);
                }
                Err(ScanError::Browser(e)) if Instant::now() < deadline => {
                    debug!("Document not available yet: {}", e);
                    tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn wait_for_new_document(&self, previous: u64, wait_until: WaitUntil) -> Result<()> {
        loop {
            match self.call::<ReadyState>(Call::Ready).await {
                Ok(ready) if ready.doc != previous && ready.reached(wait_until) => return Ok(()),
                Ok(_) => {}
                Err(ScanError::Browser(e)) => debug!("Waiting for document: {}", e),
                Err(e) => return Err(e),
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }
    }

    async fn navigate(&self, target: &Url, wait_until: WaitUntil) -> Result<Option<NavigationResponse>> {
        let previous = self.current_document().await?;
        let navigation = self.page.execute(NavigateParams::new(target.as_str())).await?;

        if let Some(ref reason) = navigation.result.error_text {
            return Err(ScanError::Navigation {
                url: target.to_string(),
                reason: reason.clone(),
            });
        }
        if navigation.result.loader_id.is_none() {
            debug!("Same-document navigation to {}", target);
            return Ok(None);
        }

        self.wait_for_new_document(previous, wait_until).await?;
        self.current_document().await?;

        let info: DocumentInfo = self.call(Call::Navigation).await?;
        let status = if info.status == 0 {
            debug!("No response status reported for {}, assuming 200", info.url);
            200
        } else {
            info.status
        };
        debug!("Loaded {} ({})", info.url, status);
        Ok(Some(NavigationResponse {
            url: info.url,
            status,
            content_type: info.content_type,
        }))
    }
}

#[async_trait]
impl Page for BrowserPage {
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<NavigationResponse>> {
        let target = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        debug!("Navigating to {} (wait until {:?})", target, wait_until);

        match tokio::time::timeout(timeout, self.navigate(&target, wait_until)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {:?}", timeout),
            }),
        }
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn title(&self) -> Result<Option<String>> {
        self.current_document().await?;
        Ok(Some(self.call::<String>(Call::Title).await?))
    }

    async fn anchor_hrefs(&self) -> Result<Vec<String>> {
        self.current_document().await?;
        self.call(Call::Hrefs).await
    }

    async fn query_first(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let doc = self.current_document().await?;
        let index: Option<usize> = self.call(Call::Query { doc, locator }).await?;
        Ok(index.map(|index| ElementHandle::new(doc, index)))
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.current_document().await?;
        self.call(Call::Count { locator }).await
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool> {
        self.call(Call::Visible { handle: element }).await
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>> {
        self.call(Call::Text { handle: element }).await
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.call(Call::Attribute {
            handle: element,
            name,
        })
        .await
    }

    /// Clear the control, then insert `value` the way an IME commit would.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.call::<bool>(Call::Clear { handle: element }).await?;
        if !value.is_empty() {
            self.page.execute(InsertTextParams::new(value)).await?;
        }
        self.call::<bool>(Call::Commit { handle: element }).await?;
        Ok(())
    }

    /// Wait for the element to become visible, then click its centre with
    /// the mouse.
    async fn click(&self, element: &ElementHandle, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.is_visible(element).await? {
            if Instant::now() >= deadline {
                return Err(ScanError::Timeout(timeout));
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }

        let token = format!("{}-{}", element.document(), element.index());
        self.call::<bool>(Call::Mark {
            handle: element,
            token: &token,
        })
        .await?;
        let target = self
            .page
            .find_element(format!(r#"[{}="{}"]"#, MARK_ATTRIBUTE, token))
            .await;
        if let Err(e) = self.call::<bool>(Call::Unmark).await {
            debug!("Could not clear click marker: {}", e);
        }
        let target = target?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, target.click()).await {
            Ok(clicked) => {
                clicked?;
                Ok(())
            }
            Err(_) => Err(ScanError::Timeout(timeout)),
        }
    }

    async fn check_validity(&self, element: &ElementHandle) -> Result<bool> {
        self.call(Call::Validity { handle: element }).await
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_options_are_headless_and_sandboxed() {
        let options = BrowserOptions::default();
        assert!(options.headless);
        assert!(options.sandbox);
        assert!(options.executable.is_none());
        assert_eq!((options.window_width, options.window_height), (1280, 800));
    }

    #[test]
    fn test_locators_serialize_for_the_page_script() {
        let locator = Locator::within(
            Locator::containing("form", r#"input[type="email"]"#),
            Locator::any_of([Locator::css("button"), Locator::text("join")]),
        );
        assert_eq!(
            serde_json::to_value(&locator).unwrap(),
            json!({
                "kind": "within",
                "value": {
                    "scope": {
                        "kind": "containing",
                        "value": { "outer": "form", "inner": "input[type=\"email\"]" }
                    },
                    "inner": {
                        "kind": "any_of",
                        "value": [
                            { "kind": "css", "value": "button" },
                            { "kind": "text", "value": "join" }
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn test_calls_carry_op_and_handle() {
        let handle = ElementHandle::new(3, 7);
        assert_eq!(
            serde_json::to_value(Call::Attribute {
                handle: &handle,
                name: "type"
            })
            .unwrap(),
            json!({ "op": "attribute", "handle": { "document": 3, "index": 7 }, "name": "type" })
        );
        assert_eq!(serde_json::to_value(Call::Unmark).unwrap(), json!({ "op": "unmark" }));
    }

    #[test]
    fn test_ready_state_thresholds() {
        let interactive = ReadyState {
            doc: 0,
            state: "interactive".to_string(),
        };
        assert!(interactive.reached(WaitUntil::DomContentLoaded));
        assert!(!interactive.reached(WaitUntil::Load));

        let loading = ReadyState {
            doc: 0,
            state: "loading".to_string(),
        };
        assert!(!loading.reached(WaitUntil::DomContentLoaded));
    }

    #[test]
    fn test_failed_reply_parses_without_value() {
        let reply: Reply =
            serde_json::from_value(json!({ "ok": false, "kind": "selector", "error": "bad" })).unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.kind.as_deref(), Some("selector"));
        assert!(reply.value.is_null());
    }

    #[test]
    fn test_options_from_partial_config() {
        let options: BrowserOptions =
            serde_json::from_value(json!({ "sandbox": false, "executable": "/usr/bin/chromium" })).unwrap();
        assert!(options.headless);
        assert!(!options.sandbox);
        assert_eq!(options.executable, Some(PathBuf::from("/usr/bin/chromium")));
    }
}
