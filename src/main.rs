mod command_script;
mod commands;
mod config;
mod headless;
mod report;

use anyhow::Result;
use config::BuildConfig;
use headless::HeadlessConfig;
use std::env;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // INFO by default; override with RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting promptbuild v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    let mut build = match &cli.config {
        Some(path) => BuildConfig::load_from_path(path),
        None => BuildConfig::load(),
    };
    if let Some(endpoint) = cli.endpoint {
        build.endpoint = endpoint;
    }
    let registry = config::load_material_registry(&build.materials_path);

    if cli.commands.is_empty() && cli.command_script.is_none() && cli.max_ticks.is_none() {
        tracing::warn!("No --command, --command-script or --max-ticks given; running until interrupted");
    }

    headless::run(HeadlessConfig {
        build,
        registry,
        commands: cli.commands,
        command_script: cli.command_script,
        max_ticks: cli.max_ticks,
        exit_when_idle: cli.exit_when_idle,
        event_log: cli.event_log,
        metrics: cli.metrics,
    })
    .await
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    commands: Vec<String>,
    command_script: Option<PathBuf>,
    max_ticks: Option<u64>,
    exit_when_idle: bool,
    event_log: Option<PathBuf>,
    metrics: Option<PathBuf>,
    endpoint: Option<String>,
}

impl CliOptions {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    if let Some(path) = args.next() {
                        opts.config = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--config requires a file path");
                    }
                }
                "--command" => {
                    if let Some(command) = args.next() {
                        opts.commands.push(command);
                    } else {
                        tracing::error!("--command requires a command string");
                    }
                }
                "--command-script" => {
                    if let Some(path) = args.next() {
                        opts.command_script = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--command-script requires a file path");
                    }
                }
                "--max-ticks" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.max_ticks = Some(value),
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--max-ticks must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--max-ticks requires an integer");
                    }
                }
                "--exit-when-idle" => opts.exit_when_idle = true,
                "--event-log" => {
                    if let Some(path) = args.next() {
                        opts.event_log = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--event-log requires a file path");
                    }
                }
                "--metrics" => {
                    if let Some(path) = args.next() {
                        opts.metrics = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--metrics requires a file path");
                    }
                }
                "--endpoint" => {
                    if let Some(url) = args.next() {
                        opts.endpoint = Some(url);
                    } else {
                        tracing::error!("--endpoint requires a URL");
                    }
                }
                other => {
                    tracing::warn!(arg = other, "Ignoring unknown argument");
                }
            }
        }

        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn repeated_commands_keep_order() {
        let opts = parse(&[
            "--command",
            "pose 0 64 0 90",
            "--command",
            "build a tower",
            "--exit-when-idle",
        ]);
        assert_eq!(opts.commands, vec!["pose 0 64 0 90", "build a tower"]);
        assert!(opts.exit_when_idle);
    }

    #[test]
    fn bad_max_ticks_is_ignored() {
        let opts = parse(&["--max-ticks", "soon", "--metrics", "out/metrics.json"]);
        assert_eq!(opts.max_ticks, None);
        assert_eq!(opts.metrics, Some(PathBuf::from("out/metrics.json")));
    }

    #[test]
    fn endpoint_override() {
        let opts = parse(&["--endpoint", "http://127.0.0.1:9/generate", "--max-ticks", "5"]);
        assert_eq!(opts.endpoint.as_deref(), Some("http://127.0.0.1:9/generate"));
        assert_eq!(opts.max_ticks, Some(5));
    }
}
