use core::time::Duration;
use std::path::PathBuf;

use sf6::{
    buckler,
    config::Config,
    export::CsvDir,
    schedule::{MonthlyTrigger, next_second_friday},
};

const CHECK_EVERY: Duration = Duration::from_secs(3600);

#[derive(clap::Parser)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "SF6_CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Earliest local hour to start on the second Friday
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(0..24))]
    hour: u32,
    /// Export once right away and exit
    #[arg(long)]
    now: bool,
    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,
}

/// Matchup then usage export into today's directory; each failure is logged on its own.
fn monthly_export(config: &Config, headless: bool) {
    let mut sink = match CsvDir::dated(config, chrono::Local::now().date_naive()) {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!(target: "scheduler", "\x1b[31moutput directory: {e}\x1b[0m");
            return;
        }
    };
    let (_browser, page) = match buckler::open_browser(config, headless) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!(target: "scheduler", "\x1b[31m{e}\x1b[0m");
            return;
        }
    };

    match buckler::matchup::run(&page, config, &mut sink) {
        Ok(records) => tracing::info!(target: "scheduler", "matchup export: {} cells", records.len()),
        Err(e) => tracing::error!(target: "scheduler", "\x1b[31mmatchup export failed: {e}\x1b[0m"),
    }
    match buckler::usage::run(&page, config, &mut sink) {
        Ok(records) => tracing::info!(target: "scheduler", "usage export: {} entries", records.len()),
        Err(e) => tracing::error!(target: "scheduler", "\x1b[31musage export failed: {e}\x1b[0m"),
    }
}

async fn run_once(config: &Config, headless: bool) {
    let config = config.clone();
    tracing::info!(target: "scheduler", "\x1b[1;32mmonthly export started\x1b[0m");
    if let Err(e) = tokio::task::spawn_blocking(move || monthly_export(&config, headless)).await {
        tracing::error!(target: "scheduler", "\x1b[31mexport task died: {e}\x1b[0m");
    }
    tracing::info!(target: "scheduler", "monthly export finished");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let headless = args.headless || config.browser.headless;

    if args.now {
        run_once(&config, headless).await;
        return Ok(());
    }

    let mut trigger = MonthlyTrigger::new(args.hour);
    let mut interval = tokio::time::interval(CHECK_EVERY);
    loop {
        interval.tick().await;
        let now = chrono::Local::now().naive_local();
        if trigger.due(now) {
            run_once(&config, headless).await;
        } else if let Some(next) = next_second_friday(now.date()) {
            tracing::debug!(target: "scheduler", "next export on {next} after {:02}:00", args.hour);
        }
    }
}
