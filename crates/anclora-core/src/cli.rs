use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "anclora",
    version,
    about = "Anclora: reminders and notifications for your anclas, habits and budget",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "anclorarc", global = true)]
    pub anclorarc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Read the dashboard from a JSON file instead of the backend.
    #[arg(long = "snapshot", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Signed-in user; overrides `user.id`.
    #[arg(long = "user", global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Register the worker, arm reminders and keep refreshing until interrupted.
    Watch {
        /// Seconds between dashboard refreshes; overrides `watch.refresh_seconds`.
        #[arg(long)]
        refresh: Option<u64>,
    },
    /// Show the reminders the current snapshot would produce.
    Plan,
    /// Show the notification permission, or ask for it.
    Permission {
        #[arg(long)]
        request: bool,
    },
    /// Deliver a push message to the background worker.
    Push {
        /// JSON payload `{title?, body?, url?}`.
        payload: Option<String>,
    },
    /// Run a background sync check by tag.
    Sync {
        tag: String,
        #[arg(long)]
        periodic: bool,
        /// Derive alerts from the dashboard instead of the sample source.
        #[arg(long)]
        live: bool,
    },
    /// Simulate a click on a worker notification.
    Click {
        #[arg(long)]
        action: Option<String>,
        #[arg(long, default_value = "/")]
        url: String,
    },
    /// Show the notification settings, optionally publishing them.
    Settings {
        #[arg(long)]
        publish: bool,
    },
    /// Ask the backend for recommendations, or chat with it.
    Insights {
        #[arg(long)]
        ask: Option<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Watch { .. } => "watch",
            Self::Plan => "plan",
            Self::Permission { .. } => "permission",
            Self::Push { .. } => "push",
            Self::Sync { .. } => "sync",
            Self::Click { .. } => "click",
            Self::Settings { .. } => "settings",
            Self::Insights { .. } => "insights",
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args};

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_lifted_out() {
        let pre = preprocess_args(&args(&[
            "anclora",
            "rc.notifications.lead_minutes=45",
            "plan",
            "rc.color:off",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["anclora", "plan"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.notifications.lead_minutes".to_string(), "45".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_subcommands_with_global_flags() {
        let cli = GlobalCli::parse_from([
            "anclora",
            "click",
            "--action",
            "dismiss",
            "-vv",
            "--rc",
            "app.origin=http://localhost:4000",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides[0].key, "app.origin");
        match cli.command {
            Some(Command::Click { action, url }) => {
                assert_eq!(action.as_deref(), Some("dismiss"));
                assert_eq!(url, "/");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
