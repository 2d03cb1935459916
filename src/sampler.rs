//! Stratified random sampling of ranking pages.
//!
//! Each stratum owns a contiguous block of ranking pages. Pages are drawn
//! uniformly without replacement; every fighter on a drawn page is followed to
//! their profile and contributes one [`Sample`] holding their best rating. A
//! stratum closes when its quota is met or when every page has been drawn.

use core::time::Duration;

use compact_str::CompactString;
use hashbrown::HashSet;
use rand::Rng;

use crate::{
    Result,
    backoff::Backoff,
    config::{Config, StratumPlan},
    export::{Sink, Tabular, write_records},
    util::file_component,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fighter {
    pub id: CompactString,
    pub character: CompactString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rating {
    pub value: i64,
    pub character: CompactString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub stratum: CompactString,
    pub subject: CompactString,
    pub rating: i64,
    pub character: CompactString,
}

impl Tabular for Sample {
    const FIELDS: &'static [&'static str] = &["stratum", "subject", "rating", "character"];

    fn row(&self) -> Vec<String> {
        vec![
            self.stratum.to_string(),
            self.subject.to_string(),
            self.rating.to_string(),
            self.character.to_string(),
        ]
    }
}

/// Where ranking pages and profiles come from.
pub trait RankingSource {
    async fn ranking_page(&mut self, stratum: &str, page: u32) -> Result<Vec<Fighter>>;

    /// The highest rating over all characters on the fighter's profile.
    async fn best_rating(&mut self, fighter: &Fighter) -> Result<Rating>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Open,
    QuotaReached,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Stratum {
    name: CompactString,
    population: u64,
    start: u32,
    end: u32,
    quota: usize,
    accepted: usize,
    visited: HashSet<u32>,
    skipped: Vec<u32>,
    samples: Vec<Sample>,
    quota_reached: bool,
}

impl Stratum {
    #[must_use]
    pub fn new(plan: StratumPlan) -> Self {
        Self {
            name: plan.name,
            population: plan.population,
            start: plan.start,
            end: plan.end.max(plan.start),
            quota: plan.quota,
            accepted: 0,
            visited: HashSet::new(),
            skipped: Vec::new(),
            samples: Vec::new(),
            quota_reached: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn population(&self) -> u64 {
        self.population
    }

    #[must_use]
    pub const fn quota(&self) -> usize {
        self.quota
    }

    #[must_use]
    pub const fn accepted(&self) -> usize {
        self.accepted
    }

    #[must_use]
    pub const fn quota_reached(&self) -> bool {
        self.quota_reached
    }

    #[must_use]
    pub const fn span(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    #[must_use]
    pub const fn visited(&self) -> &HashSet<u32> {
        &self.visited
    }

    /// Pages dropped after exhausting their attempts.
    #[must_use]
    pub fn skipped(&self) -> &[u32] {
        &self.skipped
    }

    #[must_use]
    pub fn pending(&self) -> &[Sample] {
        &self.samples
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.visited.len() >= self.span()
    }

    /// Draws an unvisited page uniformly at random and marks it visited.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<u32> {
        let span = self.span();
        let remaining = span - self.visited.len();
        if remaining == 0 {
            return None;
        }

        let page = if self.visited.len() * 2 < span {
            loop {
                let page = rng.random_range(self.start..=self.end);
                if !self.visited.contains(&page) {
                    break page;
                }
            }
        } else {
            let nth = rng.random_range(0..remaining);
            (self.start..=self.end)
                .filter(|p| !self.visited.contains(p))
                .nth(nth)?
        };

        self.visited.insert(page);
        Some(page)
    }

    pub fn skip(&mut self, page: u32) {
        self.skipped.push(page);
    }

    pub fn accept(&mut self, sample: Sample) -> Admission {
        if self.quota_reached {
            return Admission::Closed;
        }
        self.samples.push(sample);
        self.accepted += 1;
        if self.accepted >= self.quota {
            self.quota_reached = true;
            Admission::QuotaReached
        } else {
            Admission::Open
        }
    }

    fn take_samples(&mut self) -> Vec<Sample> {
        core::mem::take(&mut self.samples)
    }

    fn restore(&mut self, mut samples: Vec<Sample>) {
        samples.append(&mut self.samples);
        self.samples = samples;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    QuotaReached,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratumReport {
    pub name: CompactString,
    pub quota: usize,
    pub accepted: usize,
    pub pages_visited: usize,
    pub pages_skipped: usize,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub strata: Vec<StratumReport>,
    /// Every flushed sample, in flush order.
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Attempts per page or profile before it is skipped.
    pub max_attempts: u32,
    /// Pause range before requests that follow a success.
    pub pacing: (Duration, Duration),
    pub file_prefix: String,
}

impl SamplerOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let s = &config.spider_settings;
        Self {
            max_attempts: s.max_retries,
            pacing: (
                Duration::from_secs_f64(s.base_delay),
                Duration::from_secs_f64(s.max_delay),
            ),
            file_prefix: config.output.file_prefix.ranking.clone(),
        }
    }
}

macro_rules! retrying {
    ($this:ident, $what:expr, $call:expr) => {{
        let mut attempt = 0u32;
        loop {
            $this.pace().await;
            attempt += 1;
            match $call.await {
                Ok(value) => {
                    $this.backoff.on_success();
                    break Some(value);
                }
                Err(e) if e.is_retryable() => {
                    let wait = $this.backoff.on_failure(&mut $this.rng);
                    if attempt >= $this.options.max_attempts {
                        tracing::warn!(target: "sampler", "{}: skipped after {attempt} attempts: {e}", $what);
                        break None;
                    }
                    tracing::warn!(target: "sampler", "{}: attempt {attempt} failed: {e}, retrying in {wait:.1?}", $what);
                }
                Err(e) => {
                    tracing::error!(target: "sampler", "\x1b[31m{}: {e}\x1b[0m", $what);
                    return Err(e);
                }
            }
        }
    }};
}

pub struct Sampler<S, K, R> {
    source: S,
    sink: K,
    rng: R,
    backoff: Backoff,
    options: SamplerOptions,
}

impl<S, K, R> Sampler<S, K, R>
where
    S: RankingSource,
    K: Sink,
    R: Rng,
{
    pub const fn new(source: S, sink: K, rng: R, backoff: Backoff, options: SamplerOptions) -> Self {
        Self {
            source,
            sink,
            rng,
            backoff,
            options,
        }
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Samples every stratum in order and writes the combined file.
    ///
    /// On a fatal error every stratum still holding samples is flushed before
    /// the error is returned.
    pub async fn run(&mut self, strata: &mut [Stratum]) -> Result<RunReport> {
        let mut report = RunReport::default();

        if let Err(e) = self.sample_all(strata, &mut report).await {
            for stratum in strata.iter_mut() {
                if let Err(flush_err) = self.flush(stratum, &mut report) {
                    tracing::error!(target: "sampler", "[{}] could not save {} samples: {flush_err}", stratum.name, stratum.samples.len());
                }
            }
            return Err(e);
        }

        let file = format!("{}_all_strata.csv", self.options.file_prefix);
        write_records(&mut self.sink, &file, &report.samples)?;
        Ok(report)
    }

    async fn sample_all(&mut self, strata: &mut [Stratum], report: &mut RunReport) -> Result<()> {
        for i in 0..strata.len() {
            let outcome = self.sample_stratum(&mut strata[i], report).await?;
            let stratum = &strata[i];
            report.strata.push(StratumReport {
                name: stratum.name.clone(),
                quota: stratum.quota,
                accepted: stratum.accepted,
                pages_visited: stratum.visited.len(),
                pages_skipped: stratum.skipped.len(),
                outcome,
            });
            if strata.iter().all(Stratum::quota_reached) {
                tracing::info!(target: "sampler", "\x1b[32mall strata reached their quota\x1b[0m");
                break;
            }
        }
        Ok(())
    }

    async fn sample_stratum(&mut self, stratum: &mut Stratum, report: &mut RunReport) -> Result<Outcome> {
        let name = stratum.name.clone();
        tracing::info!(
            target: "sampler",
            "[{name}] sampling pages {}..={} towards {} samples",
            stratum.start, stratum.end, stratum.quota,
        );

        while !stratum.quota_reached {
            let Some(page) = stratum.draw(&mut self.rng) else {
                break;
            };

            let what = format!("[{name}] page {page}");
            let Some(fighters) = retrying!(self, what, self.source.ranking_page(&name, page)) else {
                stratum.skip(page);
                continue;
            };
            tracing::info!(target: "sampler", "{what}: {} fighters", fighters.len());

            for fighter in &fighters {
                let what = format!("[{name}] profile {} (page {page})", fighter.id);
                let Some(rating) = retrying!(self, what, self.source.best_rating(fighter)) else {
                    continue;
                };

                let admission = stratum.accept(Sample {
                    stratum: name.clone(),
                    subject: fighter.id.clone(),
                    rating: rating.value,
                    character: rating.character,
                });
                tracing::debug!(target: "sampler", "[{name}] {}/{}", stratum.accepted, stratum.quota);
                if admission == Admission::QuotaReached {
                    tracing::info!(target: "sampler", "\x1b[32m[{name}] quota of {} reached\x1b[0m", stratum.quota);
                    self.flush(stratum, report)?;
                    return Ok(Outcome::QuotaReached);
                }
            }
        }

        if stratum.quota_reached {
            return Ok(Outcome::QuotaReached);
        }
        tracing::warn!(
            target: "sampler",
            "[{name}] all {} pages drawn ({} skipped), only {}/{} samples",
            stratum.span(), stratum.skipped.len(), stratum.accepted, stratum.quota,
        );
        self.flush(stratum, report)?;
        Ok(Outcome::Exhausted)
    }

    fn flush(&mut self, stratum: &mut Stratum, report: &mut RunReport) -> Result<()> {
        let samples = stratum.take_samples();
        if samples.is_empty() {
            return Ok(());
        }
        let file = format!(
            "{}_{}.csv",
            self.options.file_prefix,
            file_component(&stratum.name)
        );
        match write_records(&mut self.sink, &file, &samples) {
            Ok(_) => {
                report.samples.extend(samples);
                Ok(())
            }
            Err(e) => {
                stratum.restore(samples);
                Err(e)
            }
        }
    }

    async fn pace(&mut self) {
        let wait = self.backoff.take_pending().unwrap_or_else(|| {
            let (lo, hi) = self.options.pacing;
            if hi > lo {
                Duration::from_secs_f64(self.rng.random_range(lo.as_secs_f64()..=hi.as_secs_f64()))
            } else {
                lo
            }
        });
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn stratum(start: u32, end: u32, quota: usize) -> Stratum {
        Stratum::new(StratumPlan {
            name: "m".into(),
            population: u64::from(end - start + 1) * 20,
            start,
            end,
            quota,
        })
    }

    fn sample(n: i64) -> Sample {
        Sample {
            stratum: "m".into(),
            subject: n.to_string().into(),
            rating: n,
            character: "RYU".into(),
        }
    }

    #[test]
    fn draws_every_page_once() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut s = stratum(5, 14, 10);
        let mut drawn = (0..10).map(|_| s.draw(&mut rng).unwrap()).collect::<Vec<_>>();
        assert_eq!(s.draw(&mut rng), None);
        assert!(s.is_exhausted());
        drawn.sort_unstable();
        assert_eq!(drawn, (5..=14).collect::<Vec<_>>());
    }

    #[test]
    fn closes_at_quota() {
        let mut s = stratum(1, 3, 2);
        assert_eq!(s.accept(sample(1)), Admission::Open);
        assert_eq!(s.accept(sample(2)), Admission::QuotaReached);
        assert_eq!(s.accept(sample(3)), Admission::Closed);
        assert_eq!(s.accepted(), 2);
        assert_eq!(s.pending().len(), 2);
        assert!(s.quota_reached());
    }

    #[test]
    fn restored_samples_keep_their_order() {
        let mut s = stratum(1, 3, 10);
        s.accept(sample(1));
        s.accept(sample(2));
        let taken = s.take_samples();
        s.accept(sample(3));
        s.restore(taken);
        let ratings = s.pending().iter().map(|x| x.rating).collect::<Vec<_>>();
        assert_eq!(ratings, [1, 2, 3]);
    }
}
