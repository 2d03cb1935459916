use std::path::PathBuf;

use sf6::{buckler, config::Config, export::CsvDir};

#[derive(clap::Parser)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "SF6_CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let headless = args.headless || config.browser.headless;
    let mut sink = CsvDir::dated(&config, chrono::Local::now().date_naive())?;

    let records = tokio::task::spawn_blocking(move || {
        let (_browser, page) = buckler::open_browser(&config, headless)?;
        buckler::usage::run(&page, &config, &mut sink)
    })
    .await??;

    tracing::info!(target: "usage", "\x1b[32m{} usage entries written\x1b[0m", records.len());
    Ok(())
}
