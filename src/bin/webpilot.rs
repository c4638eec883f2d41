//! Webpilot CLI.
//!
//! Thin command-line front end over [`WebPilot`]: open a page, then run a
//! single operation (screenshot, extraction, element location, or a
//! planned action sequence) and print the resulting envelope as JSON.
//!
//! Usage examples:
//!   Deterministic extraction with the CDP engine:
//!     $ cargo run --bin webpilot -- extract --url https://example.com --selector h1
//!   AI element location (requires a model key):
//!     $ MODEL_API_KEY=... cargo run --bin webpilot -- locate \
//!         --url https://example.com --description "the search button" --ai
//!   Against a running Selenium/chromedriver:
//!     $ cargo run --bin webpilot -- navigate --engine webdriver --url https://example.com

use std::env;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use webpilot::config::{EngineKind, PilotConfig, PilotConfigOverrides};
use webpilot::pilot::WebPilot;
use webpilot::types::ActionResult;

#[derive(Parser)]
#[command(
    name = "webpilot",
    author,
    version,
    about = "AI-assisted browser automation"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Browser engine: chromium (CDP) or webdriver.
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Show the launched browser window.
    #[arg(long, global = true)]
    show_browser: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a URL and wait for the page to settle.
    Navigate(PageArgs),
    /// Open a URL and capture a screenshot into the output directory.
    Screenshot(PageArgs),
    /// Open a URL and extract text from matching elements.
    Extract(ExtractArgs),
    /// Open a URL and locate an element from a description.
    Locate(LocateArgs),
    /// Open a URL, build a plan for a goal, and optionally execute it.
    Plan(PlanArgs),
}

#[derive(Args)]
struct PageArgs {
    /// Page URL to open.
    #[arg(long)]
    url: String,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    page: PageArgs,

    /// CSS selector to extract text from.
    #[arg(long, default_value = "h1, h2, .content, article")]
    selector: String,
}

#[derive(Args)]
struct LocateArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Natural-language description of the element.
    #[arg(long)]
    description: String,

    /// Consult the model before the keyword heuristic.
    #[arg(long)]
    ai: bool,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Goal to plan for.
    #[arg(long)]
    goal: String,

    /// Execute the plan instead of only printing it.
    #[arg(long)]
    execute: bool,

    /// Consult the model for planning.
    #[arg(long)]
    ai: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Command::Navigate(args) => {
            let mut pilot = build_pilot(config, false)?;
            open(&mut pilot, &args.url).await?;
            // The page is already open; report its captured state.
            let result = pilot.capture_context().await;
            finish(&mut pilot, result).await
        }
        Command::Screenshot(args) => {
            let mut pilot = build_pilot(config, false)?;
            open(&mut pilot, &args.url).await?;
            let result = pilot.agent().screenshot().await;
            finish(&mut pilot, result).await
        }
        Command::Extract(args) => {
            let mut pilot = build_pilot(config, false)?;
            open(&mut pilot, &args.page.url).await?;
            let result = pilot.agent().extract_text(&args.selector).await;
            finish(&mut pilot, result).await
        }
        Command::Locate(args) => {
            let mut pilot = build_pilot(config, args.ai)?;
            open(&mut pilot, &args.page.url).await?;
            let result = pilot.locate_element(&args.description).await;
            finish(&mut pilot, result).await
        }
        Command::Plan(args) => {
            let mut pilot = build_pilot(config, args.ai)?;
            open(&mut pilot, &args.page.url).await?;
            let plan = pilot.create_plan_for_page(&args.goal).await;
            let result = if args.execute {
                pilot.execute_plan(&plan).await
            } else {
                match serde_json::to_value(&plan) {
                    Ok(rendered) => ActionResult::ok_with(rendered),
                    Err(err) => ActionResult::fail(err.to_string()),
                }
            };
            finish(&mut pilot, result).await
        }
    }
}

fn build_config(cli: &Cli) -> Result<PilotConfig> {
    let config = PilotConfig::from_env().context("failed to read configuration")?;

    let mut overrides = PilotConfigOverrides::default();
    if let Some(engine) = &cli.engine {
        let engine = EngineKind::parse(engine)
            .ok_or_else(|| anyhow!("unknown engine '{engine}' (expected chromium or webdriver)"))?;
        overrides = overrides.engine(engine);
    }
    if cli.show_browser {
        overrides.headless = Some(false);
    }
    if cli.verbose > 0 {
        overrides.verbose = Some(webpilot::config::Verbosity::Detailed);
    }

    Ok(config.with_overrides(overrides))
}

fn build_pilot(config: PilotConfig, with_model: bool) -> Result<WebPilot> {
    if with_model {
        WebPilot::with_model(config).context("failed to attach the model client")
    } else {
        Ok(WebPilot::new(config))
    }
}

/// Bring the session up and open the page.
async fn open(pilot: &mut WebPilot, url: &str) -> Result<()> {
    let initialized = pilot.initialize().await;
    if !initialized.success {
        return Err(anyhow!(
            "initialization failed: {}",
            initialized.error.unwrap_or_default()
        ));
    }

    let navigated = pilot.navigate_to(url).await;
    if !navigated.success {
        let _ = pilot.close().await;
        return Err(anyhow!(
            "navigation to {url} failed: {}",
            navigated.error.unwrap_or_default()
        ));
    }
    info!("Opened {url}");
    Ok(())
}

/// Print the envelope, shut the session down, and map a failed envelope
/// to a non-zero exit.
async fn finish(pilot: &mut WebPilot, result: ActionResult) -> Result<()> {
    println!("{}", render(&result));

    let closed = pilot.close().await;
    if !closed.success {
        return Err(anyhow!(
            "shutdown failed: {}",
            closed.error.unwrap_or_default()
        ));
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(result.error.unwrap_or_default()))
    }
}

fn render(result: &ActionResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| format!("{result:?}"))
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
