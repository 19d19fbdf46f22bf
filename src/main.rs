use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

mod cmd;
mod config;
mod error;
mod naming;
mod registry;
mod security;
mod server;
mod utils;

use cmd::format::{Role, StyleOptions, color, table};
use cmd::{BuiltinCommands, Output, ParameterSpec};
use config::{Config, load_config_file};
use error::{ConnectionError, RegistryError};
use naming::ConnectionContext;
use naming::bridge::BridgeClient;
use registry::CommandRegistry;
use security::ProcessPolicy;
use server::{ConnectionResolver, ContextResolver};

/// AS Explorer - pluggable naming-service explorer for Java application servers.
///
/// Usage:
///   as-explorer -l                                  list available commands
///   as-explorer --command-help list                 help for one command
///   as-explorer --list-servers                      registered server types
///   as-explorer -c <command> -s <host[:port]> [-t websphere|jboss|weblogic] [opts]
///
/// Environment fallbacks (below CLI flags, above --config):
///   ASX_SERVER   server address
///   ASX_TYPE     server type key
///   ASX_BRIDGE   naming bridge command line
///
/// Examples:
///   as-explorer -c info -s was.local
///   as-explorer -c list -s jboss.local -t jboss --list-recursive --json
///   as-explorer -c describe -s was.local:2809 -u wsadmin -p secret --describe-name jdbc/ds
#[derive(Parser, Debug)]
#[command(
    name = "as-explorer",
    version,
    author,
    about = "AS Explorer - naming-service explorer for Java application servers"
)]
pub struct Cli {
    /// Command to run (see --list-commands)
    #[arg(short = 'c', long = "command", value_name = "NAME")]
    command: Option<String>,

    /// Server address (host or host:port)
    #[arg(short = 's', long = "server", value_name = "HOST[:PORT]")]
    server: Option<String>,

    /// Server type key (default: websphere)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    server_type: Option<String>,

    /// Username (ignored unless --password is also given)
    #[arg(short = 'u', long = "username")]
    username: Option<String>,

    /// Password (ignored unless --username is also given)
    #[arg(short = 'p', long = "password")]
    password: Option<String>,

    /// Override the profile's naming protocol (e.g. iiop, jnp, t3)
    #[arg(long = "protocol")]
    protocol: Option<String>,

    /// YAML or JSON config file
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bound the reachability probe and bridge handshake (0 = no limit)
    #[arg(long = "connect-timeout", value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Naming bridge command line (or ASX_BRIDGE)
    #[arg(long = "bridge", value_name = "CMDLINE")]
    bridge: Option<String>,

    /// Emit JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    /// List available commands
    #[arg(short = 'l', long = "list-commands")]
    list_commands: bool,

    /// List registered server types
    #[arg(long = "list-servers")]
    list_servers: bool,

    /// Show help for one command
    #[arg(long = "command-help", value_name = "NAME")]
    command_help: Option<String>,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            command: self.command,
            server: self.server,
            username: self.username,
            password: self.password,
            protocol: self.protocol,
            server_type: self.server_type,
            verbose: self.verbose > 0,
            json: self.json,
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            bridge: self.bridge,
        }
    }
}

const USAGE_EXIT: u8 = 2;
const FAILURE_EXIT: u8 = 1;

/* ---- Late-bound resolver ---- */

/// The naming client depends on parsed configuration, while the registry
/// (and therefore the CLI) has to exist before parsing.
#[derive(Clone, Default)]
struct LateResolver(Rc<OnceCell<ConnectionResolver>>);

impl ContextResolver for LateResolver {
    fn resolve(&self, config: &Config) -> Result<Rc<ConnectionContext>, ConnectionError> {
        match self.0.get() {
            Some(resolver) => resolver.resolve(config),
            None => Err(ConnectionError::Misconfigured {
                reason: "connection resolver not configured".to_string(),
                properties: None,
            }),
        }
    }
}

/* ---- CLI assembly ---- */

/// Derive CLI plus every contributed flag that does not collide.
/// Returns the command and the flags actually added, in merged order.
fn build_cli(merged: Vec<ParameterSpec>) -> (clap::Command, Vec<ParameterSpec>) {
    let mut cli = Cli::command();
    let mut taken: BTreeSet<String> = ["help", "version"].map(String::from).into();
    for arg in cli.get_arguments() {
        taken.insert(arg.get_id().as_str().to_string());
        if let Some(long) = arg.get_long() {
            taken.insert(long.to_string());
        }
    }

    let mut added = Vec::new();
    for spec in merged {
        if !taken.insert(spec.long.clone()) {
            warn!(flag = %spec.long, "Command flag collides with an existing flag; skipping");
            continue;
        }
        let arg = Arg::new(spec.long.clone())
            .long(spec.long.clone())
            .help(spec.help.clone())
            .help_heading("Command options");
        let arg = if spec.takes_value {
            arg.value_name("VALUE").action(ArgAction::Set)
        } else {
            arg.action(ArgAction::SetTrue)
        };
        cli = cli.arg(arg);
        added.push(spec);
    }
    (cli, added)
}

/// Hand every contributed flag present on the command line to the registry.
/// Returns the first flag no command claimed.
fn route_flags(
    registry: &mut CommandRegistry,
    added: &[ParameterSpec],
    matches: &ArgMatches,
) -> Option<String> {
    for spec in added {
        let claimed = if spec.takes_value {
            match matches.get_one::<String>(&spec.long) {
                Some(value) => registry.route_parameter(&spec.long, Some(value)),
                None => continue,
            }
        } else if matches.get_flag(&spec.long) {
            registry.route_parameter(&spec.long, None)
        } else {
            continue;
        };
        if !claimed {
            return Some(spec.long.clone());
        }
    }
    None
}

/// Verbosity is needed before discovery so skipped candidates get logged.
fn early_level(args: &[OsString]) -> tracing::Level {
    let probe = Cli::command()
        .ignore_errors(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .try_get_matches_from(args);
    match probe {
        Ok(m) => utils::derive_level(m.get_count("verbose"), m.get_flag("quiet")),
        Err(_) => utils::derive_level(0, false),
    }
}

/* ---- Listings ---- */

fn print_commands(registry: &CommandRegistry, json: bool, style: &StyleOptions) -> Result<ExitCode> {
    let summaries = match registry.list_commands() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", color(Role::Error, e.to_string(), style));
            return Ok(ExitCode::from(FAILURE_EXIT));
        }
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        let rows: Vec<Vec<String>> = summaries
            .into_iter()
            .map(|s| vec![s.name, s.description])
            .collect();
        println!("{}", table(&["NAME", "DESCRIPTION"], &rows, style));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_servers(resolver: &ConnectionResolver, json: bool, style: &StyleOptions) -> Result<()> {
    let profiles = resolver.profiles();
    if json {
        let list: Vec<serde_json::Value> = profiles
            .iter()
            .map(|p| {
                serde_json::json!({
                    "key": p.type_key(),
                    "vendor": p.vendor_name(),
                    "protocol": p.default_protocol(),
                    "port": p.default_port(),
                    "caching": p.caching().as_str(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    let rows: Vec<Vec<String>> = profiles
        .iter()
        .map(|p| {
            vec![
                p.type_key().to_string(),
                p.vendor_name().to_string(),
                p.default_protocol().to_string(),
                p.default_port().map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                p.caching().as_str().to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        table(&["KEY", "VENDOR", "PROTOCOL", "PORT", "CACHING"], &rows, style)
    );
    Ok(())
}

/* ---- Entry ---- */

fn run(args: Vec<OsString>) -> Result<ExitCode> {
    utils::init_logging(early_level(&args));
    let style = StyleOptions::detect();

    let late = LateResolver::default();
    let mut registry = CommandRegistry::new(Box::new(late.clone()), Box::new(ProcessPolicy));
    registry.discover(&BuiltinCommands);
    if registry.is_empty() {
        warn!("No commands were discovered");
    } else {
        debug!(commands = registry.len(), "Registry ready");
    }

    let (cli_cmd, added) = build_cli(registry.merged_parameters());
    let matches = match cli_cmd.try_get_matches_from(&args) {
        Ok(m) => m,
        Err(e) => e.exit(),
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(c) => c,
        Err(e) => e.exit(),
    };

    if let Some(flag) = route_flags(&mut registry, &added, &matches) {
        eprintln!(
            "{}",
            color(Role::Error, format!("No command accepts --{flag}"), &style)
        );
        return Ok(ExitCode::from(USAGE_EXIT));
    }

    let list_commands = cli.list_commands;
    let list_servers = cli.list_servers;
    let command_help = cli.command_help.clone();
    let config_path = cli.config.clone();

    let mut config = cli.into_config();
    config.fill_from_env(|key| std::env::var(key).ok());
    if let Some(path) = &config_path {
        let file = match load_config_file(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}", color(Role::Error, format!("{e:#}"), &style));
                return Ok(ExitCode::from(USAGE_EXIT));
            }
        };
        config.fill_from_file(file);
    }
    debug!(
        command = config.command.as_deref().unwrap_or("-"),
        server = config.server.as_deref().unwrap_or("-"),
        server_type = config.server_type.as_deref().unwrap_or("-"),
        "Configuration resolved"
    );

    let client = BridgeClient::new(config.bridge.clone(), config.connect_timeout);
    let resolver = ConnectionResolver::with_builtin_profiles(Box::new(client))
        .context("failed to register server profiles")?;

    if list_commands {
        return print_commands(&registry, config.json, &style);
    }
    if list_servers {
        print_servers(&resolver, config.json, &style)?;
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(name) = command_help {
        return Ok(match registry.help(&name) {
            Some(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            None => ExitCode::from(USAGE_EXIT),
        });
    }

    if late.0.set(resolver).is_err() {
        anyhow::bail!("connection resolver configured twice");
    }

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let mut out = Output::new(&mut lock, config.json, style.clone());
    match registry.dispatch(&config, &mut out) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{}", color(Role::Error, format!("{e}"), &style));
            if let RegistryError::Execution { source, .. } = &e {
                debug!(error = ?source, "Command execution failed");
            }
            if e.is_usage() {
                eprintln!("Run with --list-commands to see available commands.");
                Ok(ExitCode::from(USAGE_EXIT))
            } else {
                Ok(ExitCode::from(FAILURE_EXIT))
            }
        }
    }
}

fn main() -> ExitCode {
    match run(std::env::args_os().collect()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(FAILURE_EXIT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributed() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::with_value("describe-name", "name"),
            ParameterSpec::switch("list-recursive", "recurse"),
            ParameterSpec::with_value("list-root", "root"),
        ]
    }

    #[test]
    fn clap_parses_core_flags() {
        let cli = Cli::try_parse_from([
            "t", "-c", "list", "-s", "was.local", "-t", "websphere", "-u", "admin", "-p", "pw",
            "--json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.command.as_deref(), Some("list"));
        assert_eq!(cli.server_type.as_deref(), Some("websphere"));
        assert_eq!(cli.verbose, 2);
        let cfg = cli.into_config();
        assert!(cfg.verbose && cfg.json);
        assert_eq!(cfg.credentials().unwrap().principal, "admin");
    }

    #[test]
    fn clap_parses_listing_flags() {
        let cli = Cli::try_parse_from(["t", "-l", "--list-servers", "--command-help", "list"]).unwrap();
        assert!(cli.list_commands && cli.list_servers);
        assert_eq!(cli.command_help.as_deref(), Some("list"));
    }

    #[test]
    fn connect_timeout_must_be_numeric() {
        assert!(Cli::try_parse_from(["t", "--connect-timeout", "soon"]).is_err());
        let cli = Cli::try_parse_from(["t", "--connect-timeout", "5"]).unwrap();
        assert_eq!(
            cli.into_config().connect_timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn contributed_flags_are_accepted() {
        let (cmd, added) = build_cli(contributed());
        assert_eq!(added.len(), 3);
        let m = cmd
            .try_get_matches_from(["t", "--describe-name", "jdbc/ds", "--list-recursive"])
            .unwrap();
        assert_eq!(m.get_one::<String>("describe-name").map(String::as_str), Some("jdbc/ds"));
        assert!(m.get_flag("list-recursive"));
        assert!(m.get_one::<String>("list-root").is_none());
    }

    #[test]
    fn colliding_flags_are_skipped_first_wins() {
        let mut merged = contributed();
        merged.push(ParameterSpec::switch("server", "clashes with built-in"));
        merged.push(ParameterSpec::switch("list-root", "clashes with earlier command"));
        merged.push(ParameterSpec::switch("help", "clashes with clap"));
        let (cmd, added) = build_cli(merged);
        assert_eq!(added.len(), 3);
        // --list-root kept its value-taking form.
        let m = cmd
            .try_get_matches_from(["t", "--list-root", "jdbc"])
            .unwrap();
        assert_eq!(m.get_one::<String>("list-root").map(String::as_str), Some("jdbc"));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let (cmd, _) = build_cli(contributed());
        assert!(cmd.try_get_matches_from(["t", "--no-such-flag"]).is_err());
    }

    #[test]
    fn routed_flags_reach_builtin_commands() {
        let mut registry = CommandRegistry::new(
            Box::new(LateResolver::default()),
            Box::new(ProcessPolicy),
        );
        registry.discover(&BuiltinCommands);
        let (cmd, added) = build_cli(registry.merged_parameters());
        let m = cmd
            .try_get_matches_from(["t", "--list-root", "jdbc", "--list-recursive"])
            .unwrap();
        assert!(route_flags(&mut registry, &added, &m).is_none());
    }

    #[test]
    fn unclaimed_flag_is_reported() {
        let mut registry = CommandRegistry::new(
            Box::new(LateResolver::default()),
            Box::new(ProcessPolicy),
        );
        let (cmd, added) = build_cli(vec![ParameterSpec::switch("orphan-flag", "nobody")]);
        let m = cmd.try_get_matches_from(["t", "--orphan-flag"]).unwrap();
        assert_eq!(
            route_flags(&mut registry, &added, &m).as_deref(),
            Some("orphan-flag")
        );
    }

    #[test]
    fn unconfigured_late_resolver_is_misconfigured() {
        let err = LateResolver::default()
            .resolve(&Config::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Misconfigured { .. }));
    }

    #[test]
    fn early_level_tolerates_unknown_flags() {
        let args: Vec<OsString> = ["t", "-v", "--describe-name", "x"]
            .into_iter()
            .map(OsString::from)
            .collect();
        // Unknown contributed flags must not break the pre-scan.
        let _ = early_level(&args);
        let quiet: Vec<OsString> = ["t", "-q"].into_iter().map(OsString::from).collect();
        assert_eq!(early_level(&quiet), tracing::Level::ERROR);
    }
}
