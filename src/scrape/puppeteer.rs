use std::{ffi::OsStr, sync::Arc, thread::sleep, time::Duration};

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::BrowserConfig;

const POLL: Duration = Duration::from_millis(500);

pub fn puppeteer(cfg: &BrowserConfig, headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
        headless,
        window_size: Some((cfg.window_width, cfg.window_height)),
        idle_browser_timeout: const { Duration::from_secs(3600) },
        ..LaunchOptions::default()
    })
}

#[allow(clippy::significant_drop_tightening)]
pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

/// JS expression for the first node matching `xpath`, or `null`.
#[must_use]
pub fn xpath_node(xpath: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
        Value::String(xpath.to_owned()),
    )
}

/// Blocking, XPath-addressed view of one browser tab.
#[derive(Clone)]
pub struct Page {
    tab: Arc<Tab>,
    wait: Duration,
}

impl Page {
    pub fn new(tab: Arc<Tab>, cfg: &BrowserConfig) -> Self {
        tab.set_default_timeout(Duration::from_secs(cfg.page_load_timeout));
        Self {
            tab,
            wait: Duration::from_secs(cfg.element_wait_timeout),
        }
    }

    pub fn goto(&self, url: &str) -> anyhow::Result<()> {
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        tracing::debug!(target: "browser", "at {}", self.tab.get_url());
        Ok(())
    }

    #[must_use]
    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    pub fn eval(&self, expression: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.tab.evaluate(expression, false)?.value)
    }

    /// Runs an expression that evaluates to `JSON.stringify(..)` and decodes the result.
    pub fn eval_json<T: DeserializeOwned>(&self, expression: &str) -> anyhow::Result<T> {
        match self.eval(expression)? {
            Some(Value::String(s)) => Ok(serde_json::from_str(&s)?),
            Some(value) => anyhow::bail!("not a string: {value}"),
            None => anyhow::bail!("returned nothing"),
        }
    }

    pub fn exists(&self, xpath: &str) -> anyhow::Result<bool> {
        let expr = format!("{} !== null", xpath_node(xpath));
        Ok(matches!(self.eval(&expr)?, Some(Value::Bool(true))))
    }

    pub fn wait_for(&self, xpath: &str) -> anyhow::Result<()> {
        let deadline = std::time::Instant::now() + self.wait;
        loop {
            if self.exists(xpath)? {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                anyhow::bail!("timed out after {:?} waiting for {xpath}", self.wait);
            }
            sleep(POLL);
        }
    }

    pub fn outer_html(&self, xpath: &str) -> anyhow::Result<Option<String>> {
        let expr = format!("(() => {{ const n = {}; return n ? n.outerHTML : null; }})()", xpath_node(xpath));
        match self.eval(&expr)? {
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Null) | None => Ok(None),
            Some(value) => anyhow::bail!("not a string: {value}"),
        }
    }

    /// Scrolls the node into view and clicks it; `Ok(false)` when absent.
    pub fn click(&self, xpath: &str) -> anyhow::Result<bool> {
        if !self.exists(xpath)? {
            return Ok(false);
        }
        let element = self.tab.find_element_by_xpath(xpath)?;
        element.scroll_into_view()?;
        if let Err(e) = element.click() {
            tracing::warn!(target: "browser", "native click on {xpath} failed: {e}, using a script click");
            let expr = format!("(() => {{ const n = {}; if (n) n.click(); return n !== null; }})()", xpath_node(xpath));
            return Ok(matches!(self.eval(&expr)?, Some(Value::Bool(true))));
        }
        Ok(true)
    }

    /// Session cookies as a `Cookie` header value.
    pub fn cookie_header(&self) -> anyhow::Result<String> {
        let cookies = self.tab.get_cookies()?;
        Ok(cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }
}
