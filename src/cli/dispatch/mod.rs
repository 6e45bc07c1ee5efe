//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{ARG_CONFIG, ARG_CONFIG_DIR, ARG_ENVIRONMENT, ARG_LISTEN};
use crate::config::{self, DEFAULT_CONFIG_DIR, DEFAULT_ENVIRONMENT};
use anyhow::Result;
use std::net::SocketAddr;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config_dir = matches
        .get_one::<String>(ARG_CONFIG_DIR)
        .map_or(DEFAULT_CONFIG_DIR, String::as_str);
    let environment = matches
        .get_one::<String>(ARG_ENVIRONMENT)
        .map_or(DEFAULT_ENVIRONMENT, String::as_str);
    let config_path = config::resolve_path(
        matches.get_one::<String>(ARG_CONFIG).map(String::as_str),
        config_dir,
        environment,
    );

    Ok(Action::Server(Args {
        config_path,
        listen: matches.get_one::<SocketAddr>(ARG_LISTEN).copied(),
    }))
}
