use core::time::Duration;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use compact_str::CompactString;
use serde::Deserialize;

use crate::{Error, Result};

const SEARCH_PATHS: [&str; 3] = [
    "./config.json",
    "./personal_config.json",
    "./config.example.json",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spider_settings: SpiderSettings,
    pub backoff: BackoffConfig,
    pub output: OutputConfig,
    #[serde(alias = "selenium")]
    pub browser: BrowserConfig,
    pub urls: Urls,
    pub scraping: ScrapingConfig,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpiderSettings {
    /// Lower bound of the pause before a request, in seconds.
    pub base_delay: f64,
    /// Upper bound of the pause before a request, in seconds.
    pub max_delay: f64,
    pub user_agent: Option<String>,
    pub max_retries: u32,
    pub request_timeout: u64,
}

impl Default for SpiderSettings {
    fn default() -> Self {
        Self {
            base_delay: 1.0,
            max_delay: 3.0,
            user_agent: None,
            max_retries: 5,
            request_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_unit: f64,
    pub max_cap: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_unit: 0.5,
            max_cap: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_directory: PathBuf,
    pub folder_prefix: String,
    pub file_prefix: FilePrefix,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./output"),
            folder_prefix: "master_data".to_owned(),
            file_prefix: FilePrefix::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilePrefix {
    pub fighting_stats: String,
    pub usage_stats: String,
    pub ranking: String,
}

impl Default for FilePrefix {
    fn default() -> Self {
        Self {
            fighting_stats: "fighting_stats".to_owned(),
            usage_stats: "master_usage_stats".to_owned(),
            ranking: "ranking".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub page_load_timeout: u64,
    pub element_wait_timeout: u64,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            window_width: 1920,
            window_height: 1080,
            page_load_timeout: 20,
            element_wait_timeout: 10,
            headless: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Urls {
    pub home: String,
    pub fighting_stats_base: String,
    pub usage_stats_base: String,
    pub ranking_base: String,
    pub ranking_query: String,
    pub profile_base: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            home: "https://www.streetfighter.com/6/buckler".to_owned(),
            fighting_stats_base: "https://www.streetfighter.com/6/buckler/stats/dia_master"
                .to_owned(),
            usage_stats_base: "https://www.streetfighter.com/6/buckler/stats/usagerate_master"
                .to_owned(),
            ranking_base: "https://www.streetfighter.com/6/buckler/ranking/league".to_owned(),
            ranking_query: "character_filter=1&character_id=luke&platform=1&user_status=1&home_filter=1&home_category_id=0&home_id=1&league_rank=36".to_owned(),
            profile_base: "https://www.streetfighter.com/6/buckler/profile".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Month {
    /// `YYYYMM`, as used in the stats URLs.
    pub code: CompactString,
    pub name: CompactString,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct League {
    /// 1-based position in the league aside.
    pub index: usize,
    pub name: CompactString,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub months_to_scrape: Vec<Month>,
    pub leagues: Vec<League>,
    pub max_passes: usize,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        #[rustfmt::skip]
        let months = [
            ("202502", "022025"),
            ("202503", "032025"),
            ("202504", "042025"),
            ("202505", "052025"),
            ("202506", "062025"),
        ];
        let leagues = ["Master", "High Master", "Grand Master", "Ultimate Master"];

        Self {
            months_to_scrape: months
                .into_iter()
                .map(|(code, name)| Month {
                    code: code.into(),
                    name: name.into(),
                })
                .collect(),
            leagues: leagues
                .into_iter()
                .enumerate()
                .map(|(i, name)| League {
                    index: i + 1,
                    name: name.into(),
                })
                .collect(),
            max_passes: 4,
        }
    }
}

impl ScrapingConfig {
    #[must_use]
    pub fn league_name(&self, index: usize) -> CompactString {
        self.leagues
            .iter()
            .find(|l| l.index == index)
            .map_or_else(|| compact_str::format_compact!("Div {index}"), |l| l.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StratumConfig {
    pub name: CompactString,
    pub population: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub page_size: u64,
    /// Explicit per-stratum quota; derived from `confidence` and `margin_of_error` when absent.
    pub quota: Option<usize>,
    pub confidence: f64,
    pub margin_of_error: f64,
    pub strata: Vec<StratumConfig>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            quota: None,
            confidence: 0.95,
            margin_of_error: 0.02,
            strata: vec![StratumConfig {
                name: "m".into(),
                population: 57476,
            }],
        }
    }
}

/// Page layout and target of one stratum, derived from [`SamplingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratumPlan {
    pub name: CompactString,
    pub population: u64,
    pub start: u32,
    pub end: u32,
    pub quota: usize,
}

impl SamplingConfig {
    fn z_score(&self) -> Result<f64> {
        const TABLE: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];
        TABLE
            .iter()
            .find(|(level, _)| (level - self.confidence).abs() < 1e-9)
            .map(|&(_, z)| z)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unsupported confidence level {} (expected 0.90, 0.95 or 0.99)",
                    self.confidence
                ))
            })
    }

    /// Cochran's sample size for a proportion (p = 0.5) with finite population correction.
    pub fn required_sample_size(&self, population: u64) -> Result<usize> {
        let z = self.z_score()?;
        let e = self.margin_of_error;
        if !(e > 0.0 && e < 1.0) {
            return Err(Error::Config(format!(
                "margin_of_error must lie in (0, 1), got {e}"
            )));
        }
        let n0 = z * z * 0.25 / (e * e);
        let n = n0 / (1.0 + (n0 - 1.0) / population as f64);
        Ok(n.ceil() as usize)
    }

    pub fn quota_for(&self, population: u64) -> Result<usize> {
        let required = self.required_sample_size(population)?;
        match self.quota {
            Some(quota) if quota < required => Err(Error::Config(format!(
                "quota {quota} is below the {required} samples needed for {:.0}% confidence with a {}% margin of error",
                self.confidence * 100.0,
                self.margin_of_error * 100.0,
            ))),
            Some(quota) => Ok(quota),
            None => Ok(required.div_ceil(500) * 500),
        }
    }

    /// Lays the strata out on contiguous page ranges, in configuration order.
    pub fn plan(&self) -> Result<Vec<StratumPlan>> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".to_owned()));
        }
        let mut current = 0u32;
        let mut plans = Vec::with_capacity(self.strata.len());
        for stratum in &self.strata {
            let pages = u32::try_from(stratum.population / self.page_size).map_err(|_| {
                Error::Config(format!("stratum {} spans too many pages", stratum.name))
            })?;
            if pages == 0 {
                return Err(Error::Config(format!(
                    "stratum {} has fewer players ({}) than one page",
                    stratum.name, stratum.population
                )));
            }
            let start = current + 1;
            let end = current + pages;
            plans.push(StratumPlan {
                name: stratum.name.clone(),
                population: stratum.population,
                start,
                end,
                quota: self.quota_for(stratum.population)?,
            });
            current = end;
        }
        Ok(plans)
    }
}

/// Rejects seconds that are negative, not finite, or too large for a [`Duration`].
fn seconds(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::Config(format!("{name} must be finite, got {value}")));
    }
    Duration::try_from_secs_f64(value)
        .map(drop)
        .map_err(|e| Error::Config(format!("{name} = {value} is not a valid duration: {e}")))
}

macro_rules! env_override {
    ($lookup:expr, $name:literal, $slot:expr) => {
        if let Some(value) = $lookup($name).filter(|v: &String| !v.is_empty()) {
            match value.parse() {
                Ok(parsed) => $slot = parsed,
                Err(e) => tracing::warn!(target: "config", "ignoring {}={value:?}: {e}", $name),
            }
        }
    };
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must load. Otherwise the first existing file among
    /// `SF6_CONFIG_FILE` and the default search paths is used, and an unreadable
    /// file falls back to the built-in defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let search = SEARCH_PATHS.map(PathBuf::from);
        Self::load_with(explicit, |name| std::env::var(name).ok(), &search)
    }

    /// [`Config::load`] with the environment and search paths supplied by the caller.
    pub fn load_with<F>(explicit: Option<&Path>, lookup: F, search: &[PathBuf]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if let Some(path) = explicit {
            Self::from_path(path)?
        } else if let Some(path) = Self::discover(&lookup, search) {
            Self::from_path(&path).unwrap_or_else(|e| {
                tracing::warn!(target: "config", "could not load {}: {e}, using defaults", path.display());
                Self::default()
            })
        } else {
            tracing::warn!(target: "config", "no configuration file found, using defaults");
            Self::default()
        };

        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn discover<F>(lookup: &F, search: &[PathBuf]) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("SF6_CONFIG_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .into_iter()
            .chain(search.iter().cloned())
            .find(|p| p.is_file())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        tracing::info!(target: "config", "loaded {}", path.display());
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        env_override!(lookup, "SF6_OUTPUT_DIR", self.output.data_directory);
        env_override!(lookup, "SF6_BASE_DELAY", self.spider_settings.base_delay);
        env_override!(lookup, "SF6_MAX_DELAY", self.spider_settings.max_delay);
        env_override!(lookup, "SF6_WINDOW_WIDTH", self.browser.window_width);
        env_override!(lookup, "SF6_WINDOW_HEIGHT", self.browser.window_height);
        if let Some(ua) = lookup("SF6_USER_AGENT").filter(|v| !v.is_empty()) {
            self.spider_settings.user_agent = Some(ua);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.spider_settings;
        seconds("spider_settings.base_delay", s.base_delay)?;
        seconds("spider_settings.max_delay", s.max_delay)?;
        if s.max_delay < s.base_delay {
            return Err(Error::Config(format!(
                "request delay range [{}, {}] is invalid",
                s.base_delay, s.max_delay
            )));
        }
        if s.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_owned()));
        }
        let b = &self.backoff;
        seconds("backoff.base_unit", b.base_unit)?;
        seconds("backoff.max_cap", b.max_cap)?;
        if b.max_cap < b.base_unit {
            return Err(Error::Config(format!(
                "backoff base {} / cap {} is invalid",
                b.base_unit, b.max_cap
            )));
        }
        if self.scraping.max_passes == 0 {
            return Err(Error::Config("max_passes must be at least 1".to_owned()));
        }
        self.sampling.plan().map(drop)
    }

    /// `<data_directory>/<folder_prefix><DD><Mon><YYYY>`, e.g. `output/master_data19Jul2025`.
    #[must_use]
    pub fn dated_output_dir(&self, today: NaiveDate) -> PathBuf {
        self.output.data_directory.join(format!(
            "{}{}",
            self.output.folder_prefix,
            today.format("%d%b%Y")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_matches_the_masters_population() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.required_sample_size(57476).unwrap(), 2305);
        assert_eq!(sampling.quota_for(57476).unwrap(), 2500);
    }

    #[test]
    fn quota_below_requirement_is_rejected() {
        let sampling = SamplingConfig {
            quota: Some(1000),
            ..SamplingConfig::default()
        };
        assert!(matches!(sampling.quota_for(57476), Err(Error::Config(_))));

        let sampling = SamplingConfig {
            quota: Some(3000),
            ..SamplingConfig::default()
        };
        assert_eq!(sampling.quota_for(57476).unwrap(), 3000);
    }

    #[test]
    fn unknown_confidence_is_rejected() {
        let sampling = SamplingConfig {
            confidence: 0.97,
            ..SamplingConfig::default()
        };
        assert!(sampling.required_sample_size(1000).is_err());
    }

    #[test]
    fn strata_get_contiguous_page_ranges() {
        let sampling = SamplingConfig {
            strata: vec![
                StratumConfig {
                    name: "m".into(),
                    population: 57476,
                },
                StratumConfig {
                    name: "d".into(),
                    population: 131_548,
                },
            ],
            ..SamplingConfig::default()
        };
        let plans = sampling.plan().unwrap();
        assert_eq!((plans[0].start, plans[0].end), (1, 2873));
        assert_eq!((plans[1].start, plans[1].end), (2874, 2873 + 6577));
    }

    #[test]
    fn tiny_stratum_is_rejected() {
        let sampling = SamplingConfig {
            strata: vec![StratumConfig {
                name: "x".into(),
                population: 5,
            }],
            ..SamplingConfig::default()
        };
        assert!(sampling.plan().is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let json = r#"{
            "spider_settings": { "base_delay": 2.0, "max_delay": 4.0 },
            "selenium": { "window_width": 1280 },
            "scraping": { "leagues": [ { "index": 4, "name": "Ultimate Master" } ] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.spider_settings.base_delay, 2.0);
        assert_eq!(config.spider_settings.max_retries, 5);
        assert_eq!(config.browser.window_width, 1280);
        assert_eq!(config.browser.window_height, 1080);
        assert_eq!(config.scraping.months_to_scrape.len(), 5);
        assert_eq!(config.scraping.league_name(4), "Ultimate Master");
        assert_eq!(config.scraping.league_name(2), "Div 2");
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|name| match name {
            "SF6_OUTPUT_DIR" => Some("/tmp/sf6".to_owned()),
            "SF6_BASE_DELAY" => Some("0.25".to_owned()),
            "SF6_WINDOW_WIDTH" => Some("wide".to_owned()),
            "SF6_USER_AGENT" => Some("agent/1.0".to_owned()),
            _ => None,
        });
        assert_eq!(config.output.data_directory, PathBuf::from("/tmp/sf6"));
        assert_eq!(config.spider_settings.base_delay, 0.25);
        assert_eq!(config.browser.window_width, 1920);
        assert_eq!(config.spider_settings.user_agent.as_deref(), Some("agent/1.0"));
    }

    #[test]
    fn inverted_delay_range_fails_validation() {
        let mut config = Config::default();
        config.spider_settings.max_delay = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn infinite_or_huge_delays_fail_validation() {
        let mut config = Config::default();
        config.apply_env_overrides(|name| (name == "SF6_MAX_DELAY").then(|| "inf".to_owned()));
        assert!(config.spider_settings.max_delay.is_infinite());
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.backoff.max_cap = 1e30;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.spider_settings.base_delay = f64::NAN;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sf6_config_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const NO_ENV: fn(&str) -> Option<String> = |_| None;

    #[test]
    fn explicit_path_must_load() {
        let dir = temp_dir("explicit");
        let bad = dir.join("broken.json");
        std::fs::write(&bad, "{ not json").unwrap();

        assert!(Config::load_with(Some(bad.as_path()), NO_ENV, &[]).is_err());
        assert!(Config::load_with(Some(dir.join("absent.json").as_path()), NO_ENV, &[]).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn discovered_bad_file_falls_back_to_defaults() {
        let dir = temp_dir("fallback");
        let bad = dir.join("config.json");
        std::fs::write(&bad, r#"{ "spider_settings": "#).unwrap();

        let config = Config::load_with(None, NO_ENV, &[bad]).unwrap();
        assert_eq!(config.spider_settings.base_delay, 1.0);
        assert_eq!(config.scraping.leagues.len(), 4);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn config_file_variable_wins_over_search_paths() {
        let dir = temp_dir("env_file");
        let local = dir.join("config.json");
        std::fs::write(&local, r#"{ "spider_settings": { "max_retries": 2 } }"#).unwrap();
        let chosen = dir.join("chosen.json");
        std::fs::write(&chosen, r#"{ "spider_settings": { "max_retries": 9 } }"#).unwrap();

        let chosen_path = chosen.display().to_string();
        let lookup = |name: &str| (name == "SF6_CONFIG_FILE").then(|| chosen_path.clone());
        let config = Config::load_with(None, lookup, &[local.clone()]).unwrap();
        assert_eq!(config.spider_settings.max_retries, 9);

        let config = Config::load_with(None, NO_ENV, &[dir.join("missing.json"), local]).unwrap();
        assert_eq!(config.spider_settings.max_retries, 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dated_dir_uses_day_month_year() {
        let config = Config::default();
        let date = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        assert_eq!(
            config.dated_output_dir(date),
            PathBuf::from("./output/master_data19Jul2025")
        );
    }
}
