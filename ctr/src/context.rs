//! Application context that holds resolved configuration
//!
//! The context is built following the precedence order:
//! 1. Default values
//! 2. Config file values
//! 3. Environment variables
//! 4. CLI flags
//!
//! Once built, the context is passed as read-only throughout the application.

use crate::config::{self, Config};
use crate::format::ColorChoice;
use anyhow::Context;
use libctr::Client;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How much progress output the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    /// Default, only results and problems
    Normal,
    /// -v
    Verbose,
    /// -vv
    VeryVerbose,
    /// -vvv and more
    Trace,
}

impl VerbosityLevel {
    /// Map the number of `-v` flags to a level
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Normal,
            1 => VerbosityLevel::Verbose,
            2 => VerbosityLevel::VeryVerbose,
            _ => VerbosityLevel::Trace,
        }
    }

    /// Log filter used when RUST_LOG is not set
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "info",
            VerbosityLevel::VeryVerbose => "debug",
            VerbosityLevel::Trace => "trace",
        }
    }
}

/// Values given on the command line, `None` when the flag was not passed
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub namespace: Option<String>,
    pub timeout: Option<u64>,
    pub color: Option<ColorChoice>,
}

/// Application context with resolved configuration and runtime state
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Resolved configuration
    pub config: Config,
    /// Verbosity from -v flags
    pub verbosity: VerbosityLevel,
}

impl AppContext {
    /// Create a context from an already resolved configuration
    pub fn new(config: Config, verbosity: VerbosityLevel) -> Self {
        Self { config, verbosity }
    }

    /// Build context with precedence: defaults > config file > env vars > CLI flags
    pub fn build(cli: CliOverrides, verbosity: VerbosityLevel) -> Self {
        let config_path = config::get_config_path();
        let config = match Config::load(&config_path) {
            Ok(file_config) => file_config,
            Err(e) => {
                if config_path.exists() {
                    tracing::warn!("ignoring config file: {:#}", e);
                }
                Config::default()
            }
        };
        Self::resolve(config, |key| env::var(key).ok(), cli, verbosity)
    }

    /// Apply environment and CLI overrides on top of `config`
    pub fn resolve<F>(mut config: Config, env: F, cli: CliOverrides, verbosity: VerbosityLevel) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(color) = env("CTR_COLOR") {
            config.style.color = ColorChoice::from(color.as_str());
        }
        if let Some(snapshotter) = env("CONTAINERD_SNAPSHOTTER").filter(|s| !s.is_empty()) {
            config.snapshotter = snapshotter;
        }

        // root and namespace are read from the environment by clap
        if let Some(root) = cli.root {
            config.root = root;
        }
        if let Some(namespace) = cli.namespace {
            config.namespace = namespace;
        }
        if let Some(timeout) = cli.timeout {
            config.timeout = timeout;
        }
        if let Some(color) = cli.color {
            config.style.color = color;
        }

        Self::new(config, verbosity)
    }

    /// Deadline for a command, `None` when unlimited
    pub fn timeout(&self) -> Option<Duration> {
        (self.config.timeout > 0).then(|| Duration::from_secs(self.config.timeout))
    }

    /// Open a client on the configured root and namespace
    pub async fn client(&self) -> anyhow::Result<Client> {
        Client::builder()
            .root(&self.config.root)
            .namespace(&self.config.namespace)
            .build()
            .await
            .with_context(|| format!("failed to open store at {}", self.config.root.display()))
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
