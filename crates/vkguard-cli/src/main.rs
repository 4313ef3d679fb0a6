mod verify;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use vkguard_core::config::default_config_path;
use vkguard_core::VkGuardConfig;
use vkguard_protocol::ValidationCode;

#[derive(Parser)]
#[command(name = "vkguard")]
#[command(about = "vkguard - Vulkan validation state tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every validation code the layer can report
    Codes {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Configuration file path (defaults to the platform search path)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run the built-in misuse scenarios against the null driver
    Verify {
        /// Configuration file path (defaults to the platform search path)
        #[arg(short, long)]
        config: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct CodeEntry {
    prefix: &'static str,
    message_code: i32,
    name: &'static str,
}

fn main() -> anyhow::Result<()> {
    vkguard_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Codes { json } => {
            let entries: Vec<CodeEntry> = ValidationCode::all()
                .map(|code| CodeEntry {
                    prefix: code.layer_prefix(),
                    message_code: code.message_code(),
                    name: code.name(),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("  {:<10} {:>3}  {}", entry.prefix, entry.message_code, entry.name);
                }
                println!();
                println!("{} codes", entries.len());
            }
        }

        Commands::Config { config } => {
            let path = config.unwrap_or_else(default_config_path);
            info!("reading configuration from {}", path);

            let mut effective = if std::path::Path::new(&path).exists() {
                VkGuardConfig::load(&path)?
            } else {
                println!("# {} not found, showing defaults", path);
                VkGuardConfig::default()
            };
            if let Ok(flags) = std::env::var("VKGUARD_REPORT_FLAGS") {
                effective.apply_report_flags_override(&flags);
                println!("# report.flags overridden by VKGUARD_REPORT_FLAGS");
            }

            println!("{}", toml::to_string_pretty(&effective)?);
        }

        Commands::Verify { config, json } => {
            let path = config.unwrap_or_else(default_config_path);
            verify::run_verify(&path, json)?;
        }
    }

    Ok(())
}
