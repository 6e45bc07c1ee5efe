pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

use crate::config::{DEFAULT_CONFIG_DIR, DEFAULT_ENVIRONMENT};

pub const ARG_CONFIG: &str = "config";
pub const ARG_CONFIG_DIR: &str = "config-dir";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_LISTEN: &str = "listen";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("innkeep")
        .about("Authentication and session core for hospitality management")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("Path to a YAML config file, overrides --config-dir/--environment")
                .env("INNKEEP_CONFIG"),
        )
        .arg(
            Arg::new(ARG_CONFIG_DIR)
                .long("config-dir")
                .help("Directory holding <environment>.yaml config files")
                .default_value(DEFAULT_CONFIG_DIR)
                .env("INNKEEP_CONFIG_DIR"),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .short('e')
                .long("environment")
                .help("Deployment environment, selects the config file")
                .default_value(DEFAULT_ENVIRONMENT)
                .env("INNKEEP_ENV"),
        )
        .arg(
            Arg::new(ARG_LISTEN)
                .short('l')
                .long("listen")
                .help("Address to listen on, overrides http_server_address")
                .env("INNKEEP_LISTEN")
                .value_parser(clap::value_parser!(std::net::SocketAddr)),
        );

    logging::with_args(command)
}
