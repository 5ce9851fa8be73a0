//! Premium Demo CLI
//!
//! Command-line interface for exercising the premium subscription core
//! against simulated payment backends.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use premium_subscriptions::{Platform, Source};
use std::path::PathBuf;

mod commands;
mod simulated;
mod ui;

#[derive(Parser)]
#[command(name = "premium-demo")]
#[command(about = "Premium Demo CLI - Buy and track premium subscriptions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory
    #[arg(long, global = true, env = "PREMIUM_DEMO_DIR")]
    storage_dir: Option<String>,

    /// JSON config file with `reconciler` and `simulation` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Runtime to simulate (overrides the config file)
    #[arg(long, global = true, value_enum)]
    platform: Option<PlatformArg>,

    /// Seconds between status polls (overrides the config file)
    #[arg(long, global = true)]
    poll_secs: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlatformArg {
    Desktop,
    Mobile,
    Extension,
    Telegram,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Desktop => Platform::Desktop,
            PlatformArg::Mobile => Platform::Mobile,
            PlatformArg::Extension => Platform::Extension,
            PlatformArg::Telegram => Platform::Telegram,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Select the wallet later commands act on
    Login {
        /// Wallet address
        address: String,
    },

    /// Forget the current wallet
    Logout,

    /// List plans offered for the current platform
    Plans {
        /// Payment backend (crypto, mobile_iap, extension, trial)
        #[arg(short, long)]
        source: Option<Source>,

        /// Promo code to price the plans with
        #[arg(long)]
        promo: Option<String>,
    },

    /// Buy a plan and wait for it to settle
    Buy {
        /// Plan id (see `plans`)
        plan: String,

        /// Payment backend (defaults to the platform's)
        #[arg(short, long)]
        source: Option<Source>,

        /// Promo code (crypto only)
        #[arg(long)]
        promo: Option<String>,

        /// Seconds to wait for a pending purchase
        #[arg(long, default_value = "30")]
        wait: u64,

        /// Turn auto-renew off right after activation
        #[arg(long)]
        cancel: bool,
    },

    /// Show the subscription, resuming an interrupted purchase
    Status {
        /// Seconds to wait for a resumed purchase
        #[arg(long, default_value = "30")]
        wait: u64,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("premium_demo_cli=debug,premium_subscriptions=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("premium_demo_cli=info,premium_subscriptions=warn")
            .init();
    }

    // Setup storage directory
    let storage_dir = if let Some(dir) = cli.storage_dir {
        PathBuf::from(dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("premium-demo")
    };

    let mut config = commands::DemoConfig::load(cli.config.as_deref())?;
    if let Some(platform) = cli.platform {
        config.reconciler = config.reconciler.with_platform(platform.into());
    }
    if let Some(secs) = cli.poll_secs {
        config.reconciler = config.reconciler.with_poll_interval(secs);
        config.reconciler.validate()?;
    }

    // Dispatch commands
    match cli.command {
        Commands::Login { address } => {
            commands::login::run(&storage_dir, &address, cli.verbose).await?;
        }
        Commands::Logout => {
            commands::login::logout(&storage_dir, cli.verbose).await?;
        }
        Commands::Plans { source, promo } => {
            commands::plans::run(&storage_dir, &config, source, promo, cli.verbose).await?;
        }
        Commands::Buy {
            plan,
            source,
            promo,
            wait,
            cancel,
        } => {
            let options = commands::buy::BuyOptions {
                plan,
                source,
                promo,
                wait,
                cancel,
            };
            commands::buy::run(&storage_dir, &config, options, cli.verbose).await?;
        }
        Commands::Status { wait } => {
            commands::status::run(&storage_dir, &config, wait, cli.verbose).await?;
        }
        Commands::Config => {
            commands::config::run(&config, cli.verbose).await?;
        }
    }

    Ok(())
}
