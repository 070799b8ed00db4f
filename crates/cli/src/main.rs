mod config_commands;
mod flags_commands;
mod rules_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wapanel_config::PanelConfig,
};

#[derive(Parser)]
#[command(name = "wapanel", about = "wapanel: auto-reply rules and panel state tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/wapanel/).
    #[arg(long, global = true, env = "WAPANEL_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding the flag set files (overrides config value).
    #[arg(long, global = true, env = "WAPANEL_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bot upload checks.
    Rules {
        #[command(subcommand)]
        action: rules_commands::RulesAction,
    },
    /// Inspect or edit the persisted flag sets.
    Flags {
        #[command(subcommand)]
        action: flags_commands::FlagsAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Print the conversation id a phone number maps to.
    Normalize {
        number: String,
        /// Country code (defaults to the configured one).
        #[arg(long)]
        country_code: Option<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PanelConfig> {
    let mut config = match &cli.config {
        Some(path) => wapanel_config::load_config(path)?,
        None => wapanel_config::discover_and_load(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(&cli)?;
    debug!(data_dir = %config.resolved_data_dir().display(), "config loaded");

    match cli.command {
        Commands::Rules { action } => rules_commands::handle_rules(action),
        Commands::Flags { action } => flags_commands::handle_flags(action, &config),
        Commands::Config { action } => config_commands::handle_config(action, &config),
        Commands::Normalize {
            number,
            country_code,
        } => {
            let cc = country_code.unwrap_or_else(|| config.default_country_code.clone());
            match wapanel_common::ids::normalize_chat_input(&number, &cc) {
                Some(id) => {
                    println!("{id}");
                    Ok(())
                },
                None => anyhow::bail!("no digits in {number:?}"),
            }
        },
    }
}
