//! pii-sentinel command-line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pii_sentinel_core::{
    AccessAction, AccessRequest, ProtectionConfig, ProtectionEngine, ProtectionError, Role, StdioService,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, global = true, default_value = "info", help = "Log level (error, warn, info, debug, trace)")]
    pub log_level: String,

    #[arg(long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct InputArgs {
    #[arg(long, conflicts_with = "file", help = "Text to process (reads stdin when neither --text nor --file is given)")]
    pub text: Option<String>,

    #[arg(long, help = "File containing UTF-8 text to process")]
    pub file: Option<PathBuf>,

    #[arg(long, default_value = "", help = "Free-form label for where the text came from")]
    pub context: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report PII spans found in the text
    Detect {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Mask PII according to a role's masking profile
    Mask {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, help = "Role whose masking profile applies")]
        role: String,

        #[arg(long, conflicts_with = "no_preserve_context", help = "Keep patient narrative language such as names")]
        preserve_context: bool,

        #[arg(long, help = "Mask with the role's full profile")]
        no_preserve_context: bool,
    },
    /// Replace every PII span and print anonymization metadata
    Anonymize {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Mask text for export with the strictest profile
    Export {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Append an access record for the given content
    LogAccess {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long)]
        user: String,

        #[arg(long)]
        session: String,

        #[arg(long, default_value = "patient_narrative")]
        data_type: String,

        #[arg(long, default_value = "read", help = "read, write, export, delete or anonymize")]
        action: String,

        #[arg(long, help = "Record the access as unsuccessful")]
        failed: bool,
    },
    /// Serve line-delimited JSON requests on stdin/stdout
    Serve,
    /// Write a default configuration file
    InitConfig {
        #[arg(long, help = "Destination (defaults to the per-user config directory)")]
        path: Option<PathBuf>,

        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

impl InputArgs {
    pub async fn read_text(&self) -> Result<String> {
        if let Some(ref text) = self.text {
            return Ok(text.clone());
        }

        let bytes = match self.file {
            Some(ref path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read input file: {}", path.display()))?,
            None => {
                let mut buffer = Vec::new();
                tokio::io::stdin().read_to_end(&mut buffer).await?;
                buffer
            }
        };

        Ok(ProtectionError::from_utf8(bytes)?)
    }
}

/// `None` leaves the configured default in effect.
pub fn preserve_override(preserve_context: bool, no_preserve_context: bool) -> Option<bool> {
    match (preserve_context, no_preserve_context) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<ProtectionConfig> {
    match explicit {
        Some(config_path) => {
            info!("Loading configuration from: {}", config_path.display());
            ProtectionConfig::from_file(config_path)
        }
        None => match ProtectionConfig::get_default_config_path() {
            Ok(default_path) if default_path.exists() => {
                info!("Loading configuration from default location: {}", default_path.display());
                ProtectionConfig::from_file(&default_path)
            }
            _ => {
                info!("Using default configuration (run init-config to write one)");
                let mut config = ProtectionConfig::default();
                config.resolve_paths()?;
                Ok(config)
            }
        },
    }
}

fn build_engine(config_path: Option<&PathBuf>) -> Result<ProtectionEngine> {
    let config = load_config(config_path)?;
    Ok(ProtectionEngine::new(config)?)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path,
        None => ProtectionConfig::get_default_config_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    ProtectionConfig::default().to_file(&path)?;
    Ok(path)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', defaulting to 'info'", args.log_level);
            tracing::Level::INFO
        });

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config;

    match args.command {
        Command::Detect { input } => {
            let engine = build_engine(config_path.as_ref())?;
            let text = input.read_text().await?;
            let report = engine.detect_pii(&text, &input.context);
            let summary = report.summary();
            print_json(&json!({ "report": report, "summary": summary }))
        }
        Command::Mask {
            input,
            role,
            preserve_context,
            no_preserve_context,
        } => {
            let engine = build_engine(config_path.as_ref())?;
            let text = input.read_text().await?;
            let outcome = engine.mask_pii(
                &text,
                &Role::new(role),
                &input.context,
                preserve_override(preserve_context, no_preserve_context),
            );
            print_json(&serde_json::to_value(outcome)?)
        }
        Command::Anonymize { input } => {
            let engine = build_engine(config_path.as_ref())?;
            let text = input.read_text().await?;
            let (anonymized, record) = engine.anonymize(&text, &input.context);
            print_json(&json!({ "text": anonymized, "metadata": record.metadata }))
        }
        Command::Export { input } => {
            let engine = build_engine(config_path.as_ref())?;
            let text = input.read_text().await?;
            print_json(&serde_json::to_value(engine.mask_for_export(&text, &input.context))?)
        }
        Command::LogAccess {
            input,
            user,
            session,
            data_type,
            action,
            failed,
        } => {
            let engine = build_engine(config_path.as_ref())?;
            let request = AccessRequest {
                user_id: user,
                session_id: session,
                data_type,
                data_content: input.read_text().await?,
                action: action.parse::<AccessAction>()?,
                success: !failed,
                context: input.context.clone(),
            };
            print_json(&serde_json::to_value(engine.log_access(&request))?)
        }
        Command::Serve => {
            let engine = build_engine(config_path.as_ref())?;
            let service = StdioService::new(Arc::new(engine));
            service.run().await?;
            Ok(())
        }
        Command::InitConfig { path, force } => {
            let written = init_config(path, force)?;
            info!("Wrote default configuration to {}", written.display());
            print_json(&json!({ "config_path": written }))
        }
    }
}
