pub mod puppeteer;

use core::time::Duration;

use reqwest::{
    Client,
    header::{COOKIE, HeaderMap, HeaderValue},
};

use crate::{Error, Result, config::Config};

pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

/// The configured user agent, or a random desktop one.
#[must_use]
pub fn user_agent(config: &Config) -> String {
    use rand::seq::IndexedRandom;

    if let Some(ua) = &config.spider_settings.user_agent {
        return ua.clone();
    }
    let ua = USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);
    tracing::info!(target: "scrape", "choosing user-agent \x1b[1;36m{ua}\x1b[0m ...");
    ua.to_owned()
}

/// HTTP client for Buckler pages, optionally carrying a logged-in session cookie.
pub fn basic(config: &Config, cookie: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| Error::Config(format!("cookie is not a valid header value: {e}")))?;
        headers.insert(COOKIE, value);
    }

    Client::builder()
        .connect_timeout(const { Duration::from_secs(8) })
        .timeout(Duration::from_secs(config.spider_settings.request_timeout))
        .user_agent(user_agent(config))
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Setup(e.into()))
}

/// GETs `url` and returns the body; any non-success status is a fetch failure.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::status(status.as_u16(), url));
    }
    Ok(response.text().await?)
}
