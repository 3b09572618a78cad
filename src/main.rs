use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ecr;
mod lambda;
mod mirror;
mod report;
mod settings;
mod transfer;

use ecr::EcrRepoManager;
use mirror::{Mirror, MirrorConfig};
use report::ConsoleReporter;
use settings::{Settings, SettingsOverrides};
use transfer::ContainerCli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory containing default/local config files
    #[arg(long, global = true)]
    config_dir: Option<String>,

    /// AWS account that owns the destination registry
    #[arg(long, global = true)]
    account_id: Option<String>,

    /// Registry region (defaults to the AWS SDK region chain)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Comma-separated list of images to mirror (e.g. "alpine:3.18,nginx:1.25")
    #[arg(long, global = true)]
    image_tags: Option<String>,

    /// Maximum number of images transferred at the same time
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Container CLI used to pull and push images (docker or podman)
    #[arg(long, global = true)]
    container_cli: Option<String>,

    /// Log the container CLI into ECR before pushing
    #[arg(long, global = true)]
    login: bool,

    /// Disable colored progress output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Create missing repositories and mirror every image (default)
    Run,
    /// Show which repositories would be created and which images mirrored
    Plan,
    /// Check configuration for errors and unused options
    CheckConfig,
    /// Serve AWS Lambda invocations, mirroring once per event (default inside Lambda)
    Lambda,
}

impl Commands {
    /// Command to run when none is given on the command line
    fn default_for(lambda_runtime_api: Option<&str>) -> Self {
        match lambda_runtime_api {
            Some(api) if !api.is_empty() => Commands::Lambda,
            _ => Commands::Run,
        }
    }
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            account_id: self.account_id.clone(),
            image_tags: self.image_tags.clone(),
            region: self.region.clone(),
            concurrency: self.concurrency,
            container_cli: self.container_cli.clone(),
            login: self.login,
        }
    }
}

/// Lines printed by `check-config`
fn config_report(settings: &Settings) -> String {
    format!(
        "✓ Configuration is valid\n  account: {}\n  images: {}",
        settings.account_id.trim(),
        settings.image_tags.len()
    )
}

/// Build the orchestrator from validated settings
async fn build_mirror(settings: &Settings, color: bool) -> Result<Mirror> {
    let manager = EcrRepoManager::new(settings.region.clone()).await?;
    let region = manager
        .region()
        .map(String::from)
        .context("AWS region not configured. Set AWS_REGION, --region or region in config")?;

    let config = MirrorConfig {
        account_id: settings.account_id.trim().to_string(),
        region,
        image_tags: settings.parsed_image_tags()?,
        concurrency: settings.concurrency,
        login: settings.login,
    };

    Ok(Mirror::new(
        config,
        Arc::new(manager),
        Arc::new(ContainerCli::new(settings.container_cli.clone())),
        Arc::new(ConsoleReporter::new(color)),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let color = !cli.no_color && std::env::var_os("NO_COLOR").is_none();

    let settings = Settings::load(cli.config_dir.as_deref(), &cli.overrides())
        .context("Invalid configuration")?;

    let lambda_runtime_api = std::env::var("AWS_LAMBDA_RUNTIME_API").ok();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::default_for(lambda_runtime_api.as_deref()));

    match command {
        Commands::CheckConfig => {
            println!("{}", config_report(&settings));
            Ok(())
        }
        Commands::Plan => {
            let mirror = build_mirror(&settings, color).await?;
            let plan = mirror.plan().await?;
            print!("{}", plan);
            Ok(())
        }
        Commands::Run => {
            let mirror = build_mirror(&settings, color).await?;
            let summary = mirror.run().await?;
            info!(
                "Mirrored {} images, created {} repositories",
                summary.mirrored.len(),
                summary.created.len()
            );
            Ok(())
        }
        Commands::Lambda => {
            // Log output goes to CloudWatch, which does not render colors
            let mirror = build_mirror(&settings, false).await?;
            lambda::serve(mirror).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["ecr-mirror"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.login);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ecr-mirror",
            "plan",
            "--account-id",
            "123456789012",
            "--image-tags",
            "alpine:3.18,nginx:1.25",
            "--concurrency",
            "4",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Commands::Plan)));
        let overrides = cli.overrides();
        assert_eq!(overrides.account_id.as_deref(), Some("123456789012"));
        assert_eq!(overrides.image_tags.as_deref(), Some("alpine:3.18,nginx:1.25"));
        assert_eq!(overrides.concurrency, Some(4));
    }

    #[test]
    fn test_default_command_inside_lambda() {
        assert!(matches!(Commands::default_for(None), Commands::Run));
        assert!(matches!(Commands::default_for(Some("")), Commands::Run));
        assert!(matches!(
            Commands::default_for(Some("127.0.0.1:9001")),
            Commands::Lambda
        ));

        let cli = Cli::try_parse_from(["ecr-mirror", "lambda"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Lambda)));
    }

    #[test]
    fn test_config_report_shows_trimmed_account() {
        let settings = Settings {
            account_id: " 123456789012\n".to_string(),
            image_tags: vec!["alpine:3.18".to_string(), "nginx:1.25".to_string()],
            region: None,
            concurrency: 1,
            container_cli: "docker".to_string(),
            login: false,
        };
        settings.validate().unwrap();

        assert_eq!(
            config_report(&settings),
            "✓ Configuration is valid\n  account: 123456789012\n  images: 2"
        );
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
