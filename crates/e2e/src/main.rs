//! Lochness WebUI E2E runner
//!
//! Exit codes: 0 when every selected scenario passed, 1 when any failed,
//! 2 when the harness itself could not run (bad config, missing
//! credentials, unreachable WebUI, no Playwright).

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lochness_e2e::{E2eResult, HarnessConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "lochness-e2e")]
#[command(about = "End-to-end fixture lifecycle harness for the Lochness WebUI")]
struct Args {
    /// Harness config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the WebUI base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only the scenario with this name
    #[arg(short, long, conflicts_with = "tag")]
    name: Option<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Run the browser headless (true/false)
    #[arg(long)]
    headless: Option<bool>,

    /// Output directory for screenshots and results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Launch the WebUI from the `app` config section instead of
    /// connecting to a running instance
    #[arg(long)]
    launch_app: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    if let Some(headless) = args.headless {
        config.browser.headless = headless;
    }
    if let Some(output) = args.output {
        config.fixture_store = output.join("shared_test_data.json");
        config.artifacts_dir = output;
    }

    let mut runner = TestRunner::new(config)?;

    if args.list {
        for (name, tags) in runner.list() {
            println!("{:<40} {}", name, tags.join(","));
        }
        return Ok(true);
    }

    runner.start_app(args.launch_app).await?;

    let results = if let Some(name) = args.name {
        runner.run_named(&name).await
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await
    } else {
        runner.run_all().await
    };

    // Suite-owned fixtures are torn down whatever happened above
    let leftovers = runner.finish().await;
    for (record, warning) in leftovers.warnings() {
        warn!("Suite cleanup of {} {} failed: {}", record.kind, record.id, warning.reason);
    }
    runner.stop_app()?;

    let results = results?;
    runner.write_results(&results)?;
    info!("{} of {} scenario(s) passed", results.passed, results.total);
    Ok(results.success())
}
