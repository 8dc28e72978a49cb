//! snippet-harness: run documentation snippets against a live backend.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snippet_harness::suite::{Runner, SnippetCase, TestDefinition, render};
use snippet_harness::{
    ExitStatus, HarnessConfig, OutputSink, Program, ServerNow, Template, TestManager,
};

#[derive(Parser)]
#[command(name = "snippet-harness")]
#[command(about = "Render, run and check documentation snippets", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test definition under PATH for one SDK version
    Run {
        /// A directory to crawl or a single `.test.yml` file
        path: PathBuf,

        /// SDK whose snippets are run
        #[arg(long)]
        sdk: String,

        /// SDK version the definitions must target
        #[arg(long = "sdk-version")]
        sdk_version: String,
    },

    /// Print a test's snippet rendered into its template
    Render {
        /// The `.test.yml` definition
        test: PathBuf,

        /// SDK runner deciding the file extension
        #[arg(long)]
        sdk: String,
    },

    /// Run the built-in server time snippet under a template
    Probe {
        /// plain, capture, realtime, print-result or create-document-after
        #[arg(long, default_value = "capture")]
        template: Template,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitStatus::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            path,
            sdk,
            sdk_version,
        } => {
            let mut manager = TestManager::new(&sdk, &sdk_version, config.suite, OutputSink::stdout())?;
            manager.crawl(&path)?;
            Ok(manager.run_all().await?)
        }
        Commands::Render { test, sdk } => {
            let Some(runner) = Runner::resolve(&sdk, &config.suite) else {
                bail!(
                    "Unknown SDK {sdk}. Supported SDKs: {}",
                    Runner::supported(&config.suite).join(", ")
                );
            };
            let definition = TestDefinition::load(&test)?;
            let case = SnippetCase::build(&test, definition, &runner, &config.suite.templates_dir)?;
            let template = std::fs::read_to_string(&case.template_file)
                .with_context(|| format!("reading {}", case.template_file.display()))?;
            print!("{}", render::render(&template, &case.snippet)?);
            Ok(ExitStatus::Success)
        }
        Commands::Probe {
            template,
            host,
            port,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            Ok(Program::new(template, ServerNow)
                .run(&config, OutputSink::stdout())
                .await)
        }
    }
}

/// File settings, then `KUZZLE_HOST`/`KUZZLE_PORT`; flags are applied later.
fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    Ok(config.apply_env()?)
}
