mod cli;
mod demo;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use parley_call::CallKind;
use parley_common::{ConfigError, ParleyError};
use parley_config::toml_loader::{create_default_config, default_config_path};
use parley_config::ParleyConfig;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use cli::{Command, ConfigAction, DemoKind};

const REDACTED: &str = "[REDACTED]";

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Path and init must not trigger creation of the default file.
    let needs_config = matches!(
        args.command,
        Command::Demo { .. }
            | Command::Config {
                action: ConfigAction::Show
            }
    );
    let loaded = needs_config.then(|| read_config(args.config.as_deref()));

    let config_directive = match &loaded {
        Some(Ok(config)) => format!("parley={}", config.logging.level.as_directive()),
        _ => "parley=info".to_string(),
    };
    init_logging(args.log_level.as_deref().unwrap_or(&config_directive));
    tracing::debug!("Parley v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            tracing::warn!("Config load failed, using defaults: {e}");
            ParleyConfig::default()
        }
        None => ParleyConfig::default(),
    };

    let result = match args.command {
        Command::Demo { kind, hold_secs } => {
            let kind = match kind {
                DemoKind::Audio => CallKind::Audio,
                DemoKind::Video => CallKind::Video,
            };
            demo::run(&config, kind, Duration::from_secs(hold_secs))
                .await
                .map_err(|e| ParleyError::Call(e.to_string()))
        }
        Command::Config { action } => run_config(action, args.config.as_deref(), config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(directive: &str) {
    let mut filter = EnvFilter::from_default_env();
    match directive.parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("ignoring invalid log level {directive:?}: {e}"),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The override file if given, else the default location.
fn read_config(path: Option<&str>) -> Result<ParleyConfig, ConfigError> {
    match path {
        Some(path) => parley_config::load_config_from(&PathBuf::from(path)),
        None => parley_config::load_config(),
    }
}

fn config_path(path: Option<&str>) -> Result<PathBuf, ConfigError> {
    match path {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_config_path(),
    }
}

fn run_config(
    action: ConfigAction,
    path: Option<&str>,
    config: ParleyConfig,
) -> parley_common::Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path(path)?.display());
        }
        ConfigAction::Show => {
            println!("{}", parley_config::config_to_json(&redact(config)));
        }
        ConfigAction::Init { force } => {
            let path = config_path(path)?;
            if path.exists() && !force {
                return Err(ParleyError::Other(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            create_default_config(&path)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn redact(mut config: ParleyConfig) -> ParleyConfig {
    if !config.signaling.api_key.is_empty() {
        config.signaling.api_key = REDACTED.into();
    }
    if config.signaling.access_token.is_some() {
        config.signaling.access_token = Some(REDACTED.into());
    }
    for server in &mut config.call.turn_servers {
        server.username = REDACTED.into();
        server.credential = REDACTED.into();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::schema::TurnServer;

    #[test]
    fn redact_hides_credentials() {
        let mut config = ParleyConfig::default();
        config.signaling.api_key = "anon-key".into();
        config.signaling.access_token = Some("jwt".into());
        config.call.turn_servers.push(TurnServer {
            urls: vec!["turn:turn.example.org:3478".into()],
            username: "user".into(),
            credential: "secret".into(),
        });

        let json = parley_config::config_to_json(&redact(config));
        assert!(!json.contains("anon-key"));
        assert!(!json.contains("jwt"));
        assert!(!json.contains("secret"));
        assert!(json.contains("turn:turn.example.org:3478"));
    }

    #[test]
    fn redact_leaves_empty_key_empty() {
        let config = redact(ParleyConfig::default());
        assert!(config.signaling.api_key.is_empty());
        assert!(config.signaling.access_token.is_none());
    }
}
