//! Street Fighter 6 Buckler's Boot Camp pages.

pub mod matchup;
pub mod ranking;
pub mod usage;

use core::time::Duration;

use headless_chrome::Browser;

use crate::{
    Error, Result,
    config::Config,
    scrape::puppeteer::{Page, first_tab, puppeteer},
};

/// Pause after a click or navigation so the page can re-render.
const SETTLE: Duration = Duration::from_secs(3);

/// Launches the browser with a single tab. Blocking.
///
/// The [`Browser`] must outlive the [`Page`]; dropping it closes Chrome.
pub fn open_browser(config: &Config, headless: bool) -> Result<(Browser, Page)> {
    let browser = puppeteer(&config.browser, headless).map_err(Error::Setup)?;
    let tab = first_tab(&browser).map_err(Error::Setup)?;
    tracing::info!(
        target: "browser",
        "chrome ready ({}x{}, headless: {headless})",
        config.browser.window_width, config.browser.window_height,
    );
    Ok((browser, Page::new(tab, &config.browser)))
}

/// DOM scripting failures on an open page; the page may recover on the next navigation.
pub(crate) fn dom(err: anyhow::Error) -> Error {
    Error::Parse(format!("{err:#}"))
}

pub(crate) fn settle() {
    std::thread::sleep(SETTLE);
}
