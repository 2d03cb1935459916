//! Monthly matchup tables (`stats/dia_master`).

use compact_str::CompactString;
use serde_json::Value;

use super::{dom, settle};
use crate::{
    Result,
    config::{Config, League, Month},
    dedup::dedup,
    export::{Sink, Tabular, write_grouped},
    matrix::{GridView, Observation, Pass, RawCell, read_grid},
    scrape::puppeteer::{Page, xpath_node},
};

const CONTAINER: &str = "//*[@id='tableArea']/div[1]";
const TABLE: &str = "//*[@id='tableArea']/div[1]/table[1]";

const COOKIE_BUTTONS: [&str; 5] = [
    "//button[contains(@class, 'CybotCookiebot')]",
    "//button[contains(text(), 'Accept')]",
    "//button[contains(text(), 'OK')]",
    "//div[@id='CybotCookiebotDialog']//button",
    "//*[contains(@class, 'cookie')]//button",
];

fn container_js() -> String {
    xpath_node(CONTAINER)
}

/// The rendered matchup table of the current page.
pub struct ChromeGrid<'a> {
    page: &'a Page,
}

impl<'a> ChromeGrid<'a> {
    #[must_use]
    pub const fn new(page: &'a Page) -> Self {
        Self { page }
    }
}

impl GridView for ChromeGrid<'_> {
    fn row_labels(&mut self) -> Result<Vec<String>> {
        let js = format!(
            "(() => {{ const c = {}; if (!c) return JSON.stringify([]); \
             return JSON.stringify(Array.from(c.querySelectorAll('table tbody tr')).map(tr => {{ \
               const s = tr.querySelector('th div > span:first-of-type'); return s ? s.innerText : ''; }})); }})()",
            container_js(),
        );
        self.page.eval_json(&js).map_err(dom)
    }

    fn visible_cells(&mut self) -> Result<Vec<RawCell>> {
        let js = format!(
            "(() => {{ const c = {}; if (!c) return JSON.stringify(null); \
             const box = c.getBoundingClientRect(); const out = []; \
             c.querySelectorAll('table tbody tr').forEach((tr, r) => {{ \
               const th = tr.querySelector('th'); \
               const left = th ? Math.max(box.left, th.getBoundingClientRect().right) : box.left; \
               tr.querySelectorAll('td').forEach((td, col) => {{ \
                 const b = td.getBoundingClientRect(); \
                 if (b.left >= left - 1 && b.right <= box.right + 1) out.push([r, col, td.innerText]); }}); }}); \
             return JSON.stringify(out); }})()",
            container_js(),
        );
        let cells: Option<Vec<(usize, usize, String)>> = self.page.eval_json(&js).map_err(dom)?;
        let cells = cells.ok_or_else(|| crate::Error::parse("matchup table container is gone"))?;
        Ok(cells
            .into_iter()
            .map(|(row, column, text)| RawCell { row, column, text })
            .collect())
    }

    fn reveal(&mut self, column: usize) -> Result<bool> {
        let js = format!(
            "(() => {{ const c = {}; if (!c) return false; \
             const tr = c.querySelector('table tbody tr'); if (!tr) return false; \
             const td = tr.querySelectorAll('td')[{column}]; if (!td) return false; \
             const th = tr.querySelector('th'); const sticky = th ? th.getBoundingClientRect().width : 0; \
             const before = c.scrollLeft; \
             c.scrollLeft = before + td.getBoundingClientRect().left - c.getBoundingClientRect().left - sticky; \
             return c.scrollLeft !== before; }})()",
            container_js(),
        );
        let moved = matches!(self.page.eval(&js).map_err(dom)?, Some(Value::Bool(true)));
        if moved {
            std::thread::sleep(const { core::time::Duration::from_millis(800) });
        }
        Ok(moved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchupRecord {
    /// Column character; for a total cell, the row's own character.
    pub character_name: CompactString,
    pub month: CompactString,
    pub league: CompactString,
    /// Row character, or [`crate::matrix::TOTAL`].
    pub row_type: CompactString,
    pub value: String,
    pub row_index: usize,
    pub column_index: usize,
    pub pass: Pass,
}

impl MatchupRecord {
    #[must_use]
    pub fn new(obs: Observation, month: &str, league: &str) -> Self {
        Self {
            character_name: obs.column,
            month: month.into(),
            league: league.into(),
            row_type: obs.row,
            value: obs.value,
            row_index: obs.row_index,
            column_index: obs.column_index,
            pass: obs.pass,
        }
    }
}

impl Tabular for MatchupRecord {
    const FIELDS: &'static [&'static str] = &[
        "character_name",
        "month",
        "league",
        "row_type",
        "value",
        "row_index",
        "column_index",
        "pass",
        "source",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.character_name.to_string(),
            self.month.to_string(),
            self.league.to_string(),
            self.row_type.to_string(),
            self.value.clone(),
            self.row_index.to_string(),
            self.column_index.to_string(),
            self.pass.to_string(),
            "tabular_extraction".to_owned(),
        ]
    }
}

/// Reads one grid and turns its deduplicated observations into records.
pub fn extract<V: GridView + ?Sized>(
    view: &mut V,
    max_passes: usize,
    month: &Month,
    league: &League,
) -> Result<Vec<MatchupRecord>> {
    let read = read_grid(view, max_passes)?;
    let raw = read.observations.len();
    let records = dedup(read.observations)
        .into_iter()
        .map(|obs| MatchupRecord::new(obs, &month.name, &league.name))
        .collect::<Vec<_>>();
    tracing::info!(
        target: "matchup",
        "{} {}: {} cells ({raw} raw) over {} passes",
        month.name, league.name, records.len(), read.passes,
    );
    Ok(records)
}

pub fn dismiss_cookie_dialog(page: &Page) {
    for xpath in COOKIE_BUTTONS {
        match page.click(xpath) {
            Ok(true) => {
                tracing::info!(target: "matchup", "dismissed cookie dialog via {xpath}");
                settle();
                return;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!(target: "matchup", "{xpath}: {e:#}"),
        }
    }
    tracing::info!(target: "matchup", "no cookie dialog");
}

fn select_league(page: &Page, league: &League) -> Result<()> {
    let xpath = format!("//article[2]/aside[2]/ul/li[{}]", league.index);
    page.wait_for(&xpath).map_err(dom)?;
    if !page.click(&xpath).map_err(dom)? {
        return Err(crate::Error::parse(format!("league entry {xpath} is not clickable")));
    }
    settle();
    page.wait_for(TABLE).map_err(dom)
}

/// Every configured month and league, written as `<prefix>_<month>.csv` and `<prefix>_all_months.csv`.
///
/// A month or league that cannot be read is logged and left out. Blocking.
pub fn run<K: Sink + ?Sized>(page: &Page, config: &Config, sink: &mut K) -> Result<Vec<MatchupRecord>> {
    let scraping = &config.scraping;
    let base = config.urls.fighting_stats_base.trim_end_matches('/');
    let mut records = Vec::new();

    for (i, month) in scraping.months_to_scrape.iter().enumerate() {
        let url = format!("{base}/{}", month.code);
        tracing::info!(target: "matchup", "\x1b[1;34m{}\x1b[0m: {url}", month.name);
        if let Err(e) = page.goto(&url) {
            tracing::error!(target: "matchup", "\x1b[31mcould not open {url}: {e:#}\x1b[0m");
            continue;
        }
        settle();
        tracing::debug!(target: "matchup", "landed on {}", page.current_url());
        if i == 0 {
            dismiss_cookie_dialog(page);
        }

        for league in &scraping.leagues {
            let mut grid = ChromeGrid::new(page);
            let extracted = select_league(page, league)
                .and_then(|()| extract(&mut grid, scraping.max_passes, month, league));
            match extracted {
                Ok(mut found) => records.append(&mut found),
                Err(e) if e.is_retryable() => {
                    tracing::error!(target: "matchup", "\x1b[31m{} {}: {e}\x1b[0m", month.name, league.name);
                }
                Err(e) => return Err(e),
            }
        }
    }

    if records.is_empty() {
        tracing::warn!(target: "matchup", "no matchup data extracted, nothing written");
        return Ok(records);
    }
    write_grouped(
        sink,
        &config.output.file_prefix.fighting_stats,
        "all_months",
        &records,
        |r| r.month.as_str(),
    )?;
    Ok(records)
}
