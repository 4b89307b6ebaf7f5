use crate::config::{Config, ConfigOverrides};
use crate::llm::OllamaClient;
use crate::schema::EndpointSchema;
use crate::server;
use crate::store::SchemaStore;
use crate::synthesizer::ResponseSynthesizer;
use crate::{log_debug, logger};

use anyhow::{Context, Result, anyhow};
use clap::builder::{Styles, styling::AnsiColor};
use clap::{Args, Parser, Subcommand, crate_version};
use colored::Colorize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_FILE: &str = "schema-mock-debug.log";

/// CLI structure defining the available commands and global arguments
#[derive(Parser)]
#[command(
    author,
    version = crate_version!(),
    about = "schema-mock: LLM-backed mock API server",
    long_about = "schema-mock serves REST endpoints described by JSON schema files and fills their responses using a local LLM, falling back to schema-derived sample data.",
    styles = get_styles(),
)]
pub struct Cli {
    /// Subcommands available for the CLI
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug messages to a file
    #[arg(
        short = 'l',
        long = "log",
        global = true,
        help = "Log debug messages to a file"
    )]
    pub log: bool,

    /// Specify a custom log file path
    #[arg(
        long = "log-file",
        global = true,
        help = "Specify a custom log file path"
    )]
    pub log_file: Option<String>,

    /// Include debug output and third-party library logs
    #[arg(long, global = true, help = "Include debug output and library logs")]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Settings that override the loaded configuration
#[derive(Args, Clone, Default, Debug)]
pub struct OverrideArgs {
    /// Base URL of the LLM service
    #[arg(long, global = true, help = "Base URL of the LLM service")]
    pub llm_host: Option<String>,

    /// Model used for generation
    #[arg(long, global = true, help = "Model used for generation")]
    pub model: Option<String>,

    /// LLM request timeout in seconds
    #[arg(long, global = true, help = "LLM request timeout in seconds")]
    pub timeout: Option<u64>,

    /// Address to bind the server to
    #[arg(long, global = true, help = "Address to bind the server to")]
    pub host: Option<String>,

    /// Port to bind the server to
    #[arg(short, long, global = true, help = "Port to bind the server to")]
    pub port: Option<u16>,

    /// Directory containing endpoint schema files
    #[arg(long = "schemas", global = true, help = "Directory containing endpoint schema files")]
    pub schemas_dir: Option<PathBuf>,

    /// Directory of static files served for non-mock paths
    #[arg(long, global = true, help = "Directory of static files served for non-mock paths")]
    pub static_dir: Option<PathBuf>,
}

impl From<&OverrideArgs> for ConfigOverrides {
    fn from(args: &OverrideArgs) -> Self {
        Self {
            llm_host: args.llm_host.clone(),
            model: args.model.clone(),
            timeout_secs: args.timeout,
            host: args.host.clone(),
            port: args.port,
            schemas_dir: args.schemas_dir.clone(),
            static_dir: args.static_dir.clone(),
        }
    }
}

/// Enumeration of available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the mock server
    #[command(
        about = "Start the mock server",
        long_about = "Load every schema in the schemas directory and serve the mock routes, the schema API and the static UI."
    )]
    Serve,

    /// Generate a single response from a schema file
    #[command(
        about = "Generate a response for one schema file",
        long_about = "Run the response synthesizer once for a schema file and print the JSON result."
    )]
    Generate {
        /// Schema file to generate a response for
        schema: PathBuf,

        /// Request input as JSON
        #[arg(short, long, help = "Request input as JSON (defaults to {})")]
        input: Option<String>,

        /// Skip the LLM and print the fallback payload
        #[arg(long, help = "Skip the LLM and print the schema fallback payload")]
        fallback: bool,
    },

    /// List the routes defined by the schemas directory
    #[command(about = "List the routes defined by the schemas directory")]
    Routes,

    /// Show or change the personal configuration
    #[command(about = "Show or change the personal configuration")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Save the override flags into the personal configuration file
    Set,
}

/// Return the styles for the CLI
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

/// Parse the command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Main function to parse arguments and handle the command
pub async fn main() -> Result<()> {
    let cli = parse_args();
    let serving = matches!(cli.command, None | Some(Commands::Serve));

    if cli.verbose {
        logger::set_verbose_logging(true);
    }
    if let Err(e) = logger::init() {
        eprintln!("Warning: failed to initialize logging: {e}");
    }
    // Keep stdout clean for commands whose output is data
    logger::set_log_to_stdout(serving);
    if cli.log {
        let log_file = cli.log_file.as_deref().unwrap_or(LOG_FILE);
        logger::set_log_file(log_file).context("Failed to open log file")?;
    }

    handle_command(cli).await
}

/// Dispatch a parsed command line
pub async fn handle_command(cli: Cli) -> Result<()> {
    let overrides = ConfigOverrides::from(&cli.overrides);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = load_config(&overrides)?;
            server::serve(&config).await
        }
        Commands::Generate {
            schema,
            input,
            fallback,
        } => {
            let config = load_config(&overrides)?;
            handle_generate(&config, &schema, input.as_deref(), fallback).await
        }
        Commands::Routes => {
            let config = load_config(&overrides)?;
            handle_routes(&config);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, &overrides),
    }
}

fn load_config(overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_overrides(overrides);
    log_debug!("Effective configuration: {:?}", config);
    Ok(config)
}

async fn handle_generate(
    config: &Config,
    schema_path: &Path,
    input: Option<&str>,
    fallback: bool,
) -> Result<()> {
    let schema = read_schema_file(schema_path)?;
    let input: Value = match input {
        Some(raw) => serde_json::from_str(raw).context("--input must be valid JSON")?,
        None => Value::Object(serde_json::Map::new()),
    };

    let value = if fallback {
        schema.fallback_response()
    } else {
        let client = OllamaClient::new(&config.llm)?;
        ResponseSynthesizer::new(Arc::new(client))
            .generate(&schema, &input)
            .await
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Read a schema file; for array files the first schema is used
fn read_schema_file(path: &Path) -> Result<EndpointSchema> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let value = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("{} contains no schemas", path.display()))?,
        other => other,
    };
    serde_json::from_value(value)
        .with_context(|| format!("{} is not an endpoint schema", path.display()))
}

fn handle_routes(config: &Config) {
    let store = SchemaStore::load(&config.server.schemas_dir);
    if store.is_empty() {
        println!(
            "{} {}",
            "No schemas found in".yellow(),
            store.dir().display()
        );
        return;
    }

    for stored in store.list() {
        println!(
            "{:<7} {} {}",
            stored.schema.method.to_uppercase().green().bold(),
            stored.schema.endpoint.cyan(),
            format!("({})", stored.name).dimmed()
        );
    }
}

fn handle_config(action: ConfigAction, overrides: &ConfigOverrides) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(overrides)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Set => {
            let path = Config::get_config_path()?;
            let mut config = if path.exists() {
                Config::from_file(&path)?
            } else {
                Config::default()
            };
            config.apply_overrides(overrides);
            config.save_to(&path)?;
            println!(
                "{} {}",
                "Configuration saved to".green(),
                path.display()
            );
        }
    }
    Ok(())
}
