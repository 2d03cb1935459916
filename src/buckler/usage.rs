//! Monthly character usage rates (`stats/usagerate_master`).

use std::sync::LazyLock;

use compact_str::{CompactString, format_compact};
use regex::Regex;
use scraper::{Html, Selector};

use super::{dom, settle};
use crate::{
    Result,
    config::{Config, ScrapingConfig},
    export::{Sink, Tabular, write_grouped},
    grammar::{Unparseable, parse_usage},
    scrape::puppeteer::Page,
    util::text_tokens,
};

const MONTH_SECTION: &str = "//article[2]/aside[1]/div/section";
const USAGE_SECTION: &str = "//article[2]/section";

struct Selectors {
    month_entry: Selector,
    column: Selector,
    entry: Selector,
}

#[allow(clippy::unwrap_used)]
static SEL: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    month_entry: Selector::parse("a, li, option").unwrap(),
    column: Selector::parse("section > div > div").unwrap(),
    entry: Selector::parse("ul > li").unwrap(),
});

#[allow(clippy::unwrap_used)]
static MONTH_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/usagerate_master/([0-9]{6})").unwrap());
#[allow(clippy::unwrap_used)]
static MONTH_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{6}$").unwrap());
#[allow(clippy::unwrap_used)]
static MONTH_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9]{2})/([0-9]{4})").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthRef {
    /// `YYYYMM`
    pub code: CompactString,
    /// `MM/YYYY`
    pub display: CompactString,
}

impl MonthRef {
    fn from_code(code: &str) -> Self {
        Self {
            code: code.into(),
            display: format_compact!("{}/{}", &code[4..6], &code[..4]),
        }
    }
}

/// Months offered by the month selector, newest first.
#[must_use]
pub fn discover_months(section_html: &str) -> Vec<MonthRef> {
    let fragment = Html::parse_fragment(section_html);
    let mut months = fragment
        .select(&SEL.month_entry)
        .filter_map(|el| {
            let href = el.value().attr("href").and_then(|h| MONTH_HREF.captures(h));
            if let Some(c) = href {
                return Some(MonthRef::from_code(&c[1]));
            }
            if let Some(v) = el.value().attr("value").filter(|v| MONTH_VALUE.is_match(v)) {
                return Some(MonthRef::from_code(v));
            }
            let text = el.text().collect::<String>();
            MONTH_TEXT
                .captures(&text)
                .map(|c| MonthRef::from_code(&format!("{}{}", &c[2], &c[1])))
        })
        .collect::<Vec<_>>();
    months.sort_unstable_by(|a, b| b.code.cmp(&a.code));
    months.dedup();
    months
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub rank: u32,
    pub character_name: CompactString,
    /// With the `%` sign, e.g. `5.855%`.
    pub usage_percentage: CompactString,
    pub change_rate: Option<CompactString>,
    pub month: CompactString,
    pub div_index: usize,
    pub rank_name: CompactString,
}

impl Tabular for UsageRecord {
    const FIELDS: &'static [&'static str] = &[
        "rank",
        "character_name",
        "usage_percentage",
        "change_rate",
        "month",
        "div_index",
        "rank_name",
        "source",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.rank.to_string(),
            self.character_name.to_string(),
            self.usage_percentage.to_string(),
            self.change_rate.as_deref().unwrap_or("N/A").to_owned(),
            self.month.to_string(),
            self.div_index.to_string(),
            self.rank_name.to_string(),
            "xpath_extraction".to_owned(),
        ]
    }
}

/// Parses the league columns of a rendered usage section.
///
/// Column `i` (1-based) is league `i`. Entries the grammar rejects are returned
/// alongside the records.
#[must_use]
pub fn parse_usage_section(
    section_html: &str,
    month: &str,
    scraping: &ScrapingConfig,
) -> (Vec<UsageRecord>, Vec<Unparseable>) {
    let fragment = Html::parse_fragment(section_html);
    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (i, column) in fragment.select(&SEL.column).enumerate() {
        let div_index = i + 1;
        let rank_name = scraping.league_name(div_index);
        for li in column.select(&SEL.entry) {
            let tokens = text_tokens(li.text());
            if tokens.is_empty() {
                continue;
            }
            match parse_usage(&tokens) {
                Ok(fields) => records.push(UsageRecord {
                    rank: fields.rank,
                    character_name: fields.character,
                    usage_percentage: format_compact!("{}%", fields.usage),
                    change_rate: fields.change,
                    month: month.into(),
                    div_index,
                    rank_name: rank_name.clone(),
                }),
                Err(e) => {
                    tracing::debug!(target: "usage", "{month} {rank_name}: {e}");
                    rejected.push(e);
                }
            }
        }
    }
    (records, rejected)
}

fn read_current(page: &Page, month: &str, scraping: &ScrapingConfig) -> Result<Vec<UsageRecord>> {
    for column in [1, 4] {
        let xpath = format!("{USAGE_SECTION}/div/div[{column}]/ul/li[1]");
        if let Err(e) = page.wait_for(&xpath) {
            tracing::warn!(target: "usage", "{month}: {e:#}");
        }
    }
    let html = page
        .outer_html(USAGE_SECTION)
        .map_err(dom)?
        .ok_or_else(|| crate::Error::parse("usage section not found"))?;
    let (records, rejected) = parse_usage_section(&html, month, scraping);
    if !rejected.is_empty() {
        tracing::warn!(target: "usage", "{month}: {} entries could not be parsed", rejected.len());
    }
    if records.is_empty() {
        tracing::warn!(target: "usage", "{month}: no usage entries");
    } else {
        tracing::info!(target: "usage", "{month}: {} entries", records.len());
    }
    Ok(records)
}

/// Every month offered by the selector, written as `<prefix>_<month>.csv` and `<prefix>_all_months.csv`.
///
/// Falls back to the month shown on the landing page when no month can be
/// discovered. A month that cannot be read is logged and left out. Blocking.
pub fn run<K: Sink + ?Sized>(page: &Page, config: &Config, sink: &mut K) -> Result<Vec<UsageRecord>> {
    let scraping = &config.scraping;
    let base = config.urls.usage_stats_base.trim_end_matches('/');
    page.goto(base).map_err(dom)?;
    settle();

    if let Err(e) = page.wait_for(MONTH_SECTION) {
        tracing::warn!(target: "usage", "month selector: {e:#}");
    }
    let months = match page.outer_html(MONTH_SECTION) {
        Ok(Some(html)) => discover_months(&html),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(target: "usage", "month selector: {e:#}");
            Vec::new()
        }
    };

    let mut records = Vec::new();
    if months.is_empty() {
        tracing::warn!(target: "usage", "no months discovered, reading the current page");
        records = read_current(page, "current", scraping)?;
    } else {
        tracing::info!(
            target: "usage",
            "discovered {} months: {}",
            months.len(),
            months.iter().map(|m| m.display.as_str()).collect::<Vec<_>>().join(", "),
        );
    }

    for month in &months {
        let url = format!("{base}/{}", month.code);
        tracing::info!(target: "usage", "\x1b[1;34m{}\x1b[0m: {url}", month.display);
        let read = page
            .goto(&url)
            .map_err(dom)
            .and_then(|()| {
                settle();
                read_current(page, &month.display, scraping)
            });
        match read {
            Ok(mut found) => records.append(&mut found),
            Err(e) if e.is_retryable() => {
                tracing::error!(target: "usage", "\x1b[31m{}: {e}\x1b[0m", month.display);
            }
            Err(e) => return Err(e),
        }
    }

    if records.is_empty() {
        tracing::warn!(target: "usage", "no usage data extracted, nothing written");
        return Ok(records);
    }
    write_grouped(
        sink,
        &config.output.file_prefix.usage_stats,
        "all_months",
        &records,
        |r| r.month.as_str(),
    )?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_months_from_links_values_and_text() {
        let html = r#"<section>
            <a href="/6/buckler/stats/usagerate_master/202505">05/2025</a>
            <a href="/6/buckler/stats/usagerate_master/202506">06/2025</a>
            <select><option value="202504">April</option></select>
            <li>03/2025</li>
            <a href="/6/buckler/stats/usagerate_master/202506">again</a>
        </section>"#;
        let months = discover_months(html);
        let codes = months.iter().map(|m| m.code.as_str()).collect::<Vec<_>>();
        assert_eq!(codes, ["202506", "202505", "202504", "202503"]);
        assert_eq!(months[0].display, "06/2025");
    }

    #[test]
    fn non_ascii_digits_are_not_months() {
        // Arabic-Indic and Devanagari digits
        let html = "<section>\
            <a href=\"/6/buckler/stats/usagerate_master/\u{662}\u{660}\u{662}\u{665}\u{660}\u{666}\">x</a>\
            <select><option value=\"\u{968}\u{966}\u{968}\u{96b}\u{966}\u{96c}\">y</option></select>\
            <li>\u{966}\u{96c}/\u{968}\u{966}\u{968}\u{96b}</li>\
            <li>06/2025</li>\
        </section>";
        let months = discover_months(html);
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].code, "202506");
    }

    fn entry(tokens: &[&str]) -> String {
        let spans = tokens.iter().map(|t| format!("<span>{t}</span>")).collect::<String>();
        format!("<li>{spans}</li>")
    }

    #[test]
    fn parses_league_columns() {
        let html = format!(
            "<section><div><div><ul>{}{}</ul></div><div><ul>{}</ul></div></div></section>",
            entry(&["1", "KEN", "7.120", "%", "+0.4%"]),
            entry(&["2", "A.K.I.", "5.855", "%", "-2.0%"]),
            entry(&["1", "M. BISON", "6.5", "%"]),
        );
        let (records, rejected) = parse_usage_section(&html, "06/2025", &ScrapingConfig::default());
        assert!(rejected.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1].row(),
            ["2", "A.K.I.", "5.855%", "-2.0%", "06/2025", "1", "Master", "xpath_extraction"]
        );
        assert_eq!(records[2].rank_name, "High Master");
        assert_eq!(records[2].row()[3], "N/A");
    }

    #[test]
    fn rejected_entries_are_reported() {
        let html = format!(
            "<section><div><div><ul>{}{}<li>  </li></ul></div></div></section>",
            entry(&["1", "KEN", "7.120", "%"]),
            entry(&["NEW", "2", "RYU"]),
        );
        let (records, rejected) = parse_usage_section(&html, "02/2025", &ScrapingConfig::default());
        assert_eq!(records.len(), 1);
        assert_eq!(rejected.len(), 1);
    }
}
