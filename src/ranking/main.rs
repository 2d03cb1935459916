use std::path::PathBuf;

use rand::{SeedableRng, rngs::StdRng};
use sf6::{
    backoff::Backoff,
    buckler::ranking::{BucklerSource, login_cookies},
    config::Config,
    export::CsvDir,
    sampler::{Sampler, SamplerOptions, Stratum},
};

#[derive(clap::Parser)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "SF6_CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Buckler session cookie; skips the interactive login
    #[arg(long, env = "SF6_COOKIE", hide_env_values = true)]
    cookie: Option<String>,
    /// Seed for page draws, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let plans = config.sampling.plan()?;
    for plan in &plans {
        tracing::info!(
            target: "ranking",
            "stratum \x1b[1;34m{}\x1b[0m: {} players on pages {}..={}, quota {}",
            plan.name, plan.population, plan.start, plan.end, plan.quota,
        );
    }

    let cookie = match args.cookie {
        Some(cookie) => cookie,
        None => login_cookies(&config).await?,
    };
    let client = sf6::scrape::basic(&config, Some(&cookie))?;
    let sink = CsvDir::dated(&config, chrono::Local::now().date_naive())?;
    let rng = args
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

    let mut sampler = Sampler::new(
        BucklerSource::new(client, &config.urls),
        sink,
        rng,
        Backoff::from_config(&config.backoff),
        SamplerOptions::from_config(&config),
    );
    let mut strata = plans.into_iter().map(Stratum::new).collect::<Vec<_>>();
    let report = sampler.run(&mut strata).await?;

    for s in &report.strata {
        tracing::info!(
            target: "ranking",
            "[{}] {:?}: {}/{} samples, {} pages drawn, {} skipped",
            s.name, s.outcome, s.accepted, s.quota, s.pages_visited, s.pages_skipped,
        );
    }
    tracing::info!(target: "ranking", "\x1b[32m{} samples written\x1b[0m", report.samples.len());
    Ok(())
}
