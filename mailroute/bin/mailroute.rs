#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use mailroute::Mailroute;

/// LMTP routing proxy
#[derive(Parser, Debug)]
#[command(name = "mailroute")]
#[command(version)]
struct Cli {
    /// Path to the service configuration (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load the configuration and routing file, report what was found, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(cli.config)?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let mailroute = Mailroute::from_ron(&config_content)?;

    if cli.check {
        let table = mailroute.check().await?;
        println!(
            "{}: listener {}, routing {} ({} users, {} backends)",
            config_path.display(),
            mailroute.listener.socket,
            mailroute.routing.display(),
            table.user_count(),
            table.backend_count()
        );
        return Ok(());
    }

    mailroute.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `MAILROUTE_CONFIG` environment variable
/// 3. ./mailroute.config.ron (current working directory)
/// 4. /etc/mailroute/mailroute.config.ron (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("MAILROUTE_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "MAILROUTE_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./mailroute.config.ron"),
        PathBuf::from("/etc/mailroute/mailroute.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - MAILROUTE_CONFIG environment variable\n{paths_tried}"
    )
}
