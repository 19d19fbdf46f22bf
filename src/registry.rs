/*!
registry.rs - command registry and dispatch engine.

  discover()          : instantiate every candidate of the command namespace
  list_commands()     : (name, description) sorted by name
  help(name)          : usage line + command help
  merged_parameters() : contributed flags, name order then declaration order
  route_parameter()   : first command (name order) claiming a flag wins
  dispatch(config)    : security bootstrap -> resolve context -> execute

The index is a BTreeMap so every iteration is in lexicographic name order.
Failures abort only the current call; the registry stays usable.
*/

use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::cmd::{COMMAND_NAMESPACE, Command, Output, ParameterSpec};
use crate::config::Config;
use crate::error::{DiscoveryError, RegistryError};
use crate::security::SecurityBootstrap;
use crate::server::ContextResolver;

/// Program name used in rendered usage lines.
pub const PROGRAM_NAME: &str = "as-explorer";

/// No-argument constructor of a command type.
pub type Constructor = fn() -> anyhow::Result<Box<dyn Command>>;

/// One discoverable command type.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub type_name: &'static str,
    pub construct: Constructor,
}

/// Enumerates candidate command types by namespace.
pub trait CommandSource {
    fn candidates(&self, namespace: &str) -> Vec<Candidate>;
}

/// Outcome of one `discover` pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<DiscoveryError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
}

pub struct CommandRegistry {
    commands: BTreeMap<String, Box<dyn Command>>,
    resolver: Box<dyn ContextResolver>,
    bootstrap: Box<dyn SecurityBootstrap>,
}

impl CommandRegistry {
    pub fn new(resolver: Box<dyn ContextResolver>, bootstrap: Box<dyn SecurityBootstrap>) -> Self {
        Self {
            commands: BTreeMap::new(),
            resolver,
            bootstrap,
        }
    }

    /// Instantiate every candidate from `source`.
    ///
    /// A candidate whose constructor fails or panics is logged and skipped.
    /// Duplicate names keep the first instance. Finding nothing is not an
    /// error here; it surfaces later from `list_commands`.
    pub fn discover(&mut self, source: &dyn CommandSource) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for candidate in source.candidates(COMMAND_NAMESPACE) {
            let command = match instantiate(&candidate) {
                Ok(c) => c,
                Err(e) => {
                    warn!(candidate = candidate.type_name, error = %e, "Skipping command candidate");
                    report.skipped.push(e);
                    continue;
                }
            };

            let name = command.name().trim().to_string();
            if name.is_empty() {
                let e = DiscoveryError::Instantiation {
                    candidate: candidate.type_name.to_string(),
                    reason: "command reports an empty name".to_string(),
                };
                warn!(candidate = candidate.type_name, error = %e, "Skipping command candidate");
                report.skipped.push(e);
                continue;
            }
            if self.commands.contains_key(&name) {
                let e = DiscoveryError::DuplicateName {
                    candidate: candidate.type_name.to_string(),
                    name,
                };
                warn!(error = %e, "Skipping command candidate");
                report.skipped.push(e);
                continue;
            }

            debug!(command = %name, candidate = candidate.type_name, "Registered command");
            report.loaded.push(name.clone());
            self.commands.insert(name, command);
        }

        debug!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "Command discovery complete"
        );
        report
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands sorted by name. An empty registry is `NoCommandsAvailable`.
    pub fn list_commands(&self) -> Result<Vec<CommandSummary>, RegistryError> {
        if self.commands.is_empty() {
            return Err(RegistryError::NoCommandsAvailable);
        }
        Ok(self
            .commands
            .iter()
            .map(|(name, c)| CommandSummary {
                name: name.clone(),
                description: c.description().to_string(),
            })
            .collect())
    }

    /// Rendered help for `name`, or `None` when no command matches.
    pub fn help(&self, name: &str) -> Option<String> {
        let command = self.commands.get(name)?;
        Some(format!(
            "Usage: {PROGRAM_NAME} [...] --command {name} {}",
            command.help()
        ))
    }

    /// All contributed flags: command name order, then declaration order.
    pub fn merged_parameters(&self) -> Vec<ParameterSpec> {
        self.commands
            .values()
            .flat_map(|c| c.parameters())
            .collect()
    }

    /// Offer a flag to each command in name order; stop at the first claim.
    pub fn route_parameter(&mut self, flag: &str, value: Option<&str>) -> bool {
        for (name, command) in self.commands.iter_mut() {
            if command.parse_parameter(flag, value) {
                debug!(flag, command = %name, "Parameter claimed");
                return true;
            }
        }
        false
    }

    /// Run the command named by `config.command` against a resolved context.
    pub fn dispatch(&self, config: &Config, out: &mut Output<'_>) -> Result<(), RegistryError> {
        let Some(name) = config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            return Err(RegistryError::NoCommandSpecified);
        };
        let Some(command) = self.commands.get(name) else {
            return Err(RegistryError::UnknownCommand {
                name: name.to_string(),
            });
        };

        self.bootstrap.ensure_installed();

        debug!(command = name, "Resolving connection context");
        let ctx = self.resolver.resolve(config)?;
        debug!(command = name, vendor = ctx.vendor(), url = ctx.provider_url(), "Executing command");

        command
            .execute(&ctx, out)
            .map_err(|source| RegistryError::Execution {
                command: name.to_string(),
                source,
            })
    }
}

fn instantiate(candidate: &Candidate) -> Result<Box<dyn Command>, DiscoveryError> {
    let construct = candidate.construct;
    let failure = |reason: String| DiscoveryError::Instantiation {
        candidate: candidate.type_name.to_string(),
        reason,
    };
    match panic::catch_unwind(AssertUnwindSafe(construct)) {
        Ok(Ok(command)) => Ok(command),
        Ok(Err(e)) => Err(failure(format!("{e:#}"))),
        Err(payload) => Err(failure(format!(
            "constructor panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::format::StyleOptions;
    use crate::error::{ConnectionError, ExecutionError};
    use crate::naming::ConnectionContext;
    use crate::naming::mock::MockSession;
    use crate::security::BootstrapOutcome;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /* ---- Test doubles ---- */

    #[derive(Default)]
    struct FakeCommand {
        name: &'static str,
        params: Vec<ParameterSpec>,
        claimed: RefCell<Vec<String>>,
    }

    impl FakeCommand {
        fn new(name: &'static str, flags: &[&str]) -> Self {
            Self {
                name,
                params: flags
                    .iter()
                    .map(|f| ParameterSpec::with_value(f, "test flag"))
                    .collect(),
                claimed: RefCell::new(Vec::new()),
            }
        }
    }

    impl Command for FakeCommand {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake command"
        }
        fn help(&self) -> &str {
            "[--fake]"
        }
        fn parameters(&self) -> Vec<ParameterSpec> {
            self.params.clone()
        }
        fn parse_parameter(&mut self, name: &str, value: Option<&str>) -> bool {
            if self.params.iter().any(|p| p.long == name) {
                self.claimed
                    .borrow_mut()
                    .push(format!("{name}={}", value.unwrap_or("")));
                return true;
            }
            false
        }
        fn execute(
            &self,
            ctx: &ConnectionContext,
            out: &mut Output<'_>,
        ) -> Result<(), ExecutionError> {
            out.line(format!(
                "{} via {} claimed [{}]",
                self.name,
                ctx.provider_url(),
                self.claimed.borrow().join(",")
            ))?;
            Ok(())
        }
    }

    struct FailingExec;

    impl Command for FailingExec {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn help(&self) -> &str {
            ""
        }
        fn execute(&self, _: &ConnectionContext, _: &mut Output<'_>) -> Result<(), ExecutionError> {
            Err(ExecutionError::MissingParameter {
                param: "broken-arg".into(),
            })
        }
    }

    fn make_list() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FakeCommand::new("list", &["list-root", "shared"])))
    }
    fn make_describe() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FakeCommand::new("describe", &["describe-name", "shared"])))
    }
    fn make_list_again() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FakeCommand::new("list", &[])))
    }
    fn make_broken() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FailingExec))
    }
    fn make_failing() -> anyhow::Result<Box<dyn Command>> {
        anyhow::bail!("missing no-arg constructor")
    }
    fn make_panicking() -> anyhow::Result<Box<dyn Command>> {
        panic!("exception during construction")
    }
    fn make_padded() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FakeCommand::new(" padded ", &[])))
    }
    fn make_unnamed() -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(FakeCommand::new("  ", &[])))
    }

    struct TableSource(Vec<Candidate>);

    impl CommandSource for TableSource {
        fn candidates(&self, namespace: &str) -> Vec<Candidate> {
            assert_eq!(namespace, COMMAND_NAMESPACE);
            self.0.clone()
        }
    }

    fn candidate(type_name: &'static str, construct: Constructor) -> Candidate {
        Candidate {
            type_name,
            construct,
        }
    }

    #[derive(Clone, Default)]
    struct SpyResolver {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl ContextResolver for SpyResolver {
        fn resolve(&self, _config: &Config) -> Result<Rc<ConnectionContext>, ConnectionError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(ConnectionError::Unreachable {
                    url: "iiop://spy:2809".into(),
                    reason: "refused".into(),
                });
            }
            Ok(Rc::new(ConnectionContext::new(
                "Spy",
                "iiop://spy:2809",
                None,
                Box::new(MockSession { bindings: vec![] }),
            )))
        }
    }

    #[derive(Clone, Default)]
    struct SpyBootstrap {
        calls: Rc<Cell<usize>>,
    }

    impl SecurityBootstrap for SpyBootstrap {
        fn ensure_installed(&self) -> BootstrapOutcome {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == 1 {
                BootstrapOutcome::Installed
            } else {
                BootstrapOutcome::AlreadyInstalled
            }
        }
    }

    fn registry_with(
        candidates: Vec<Candidate>,
        resolver: &SpyResolver,
        bootstrap: &SpyBootstrap,
    ) -> (CommandRegistry, DiscoveryReport) {
        let mut reg = CommandRegistry::new(Box::new(resolver.clone()), Box::new(bootstrap.clone()));
        let report = reg.discover(&TableSource(candidates));
        (reg, report)
    }

    fn standard() -> (CommandRegistry, SpyResolver, SpyBootstrap) {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, _) = registry_with(
            vec![
                candidate("ListCommand", make_list),
                candidate("DescribeCommand", make_describe),
            ],
            &resolver,
            &bootstrap,
        );
        (reg, resolver, bootstrap)
    }

    fn dispatch(reg: &CommandRegistry, command: Option<&str>) -> (Result<(), RegistryError>, String) {
        let config = Config {
            command: command.map(str::to_string),
            ..Default::default()
        };
        let mut buf: Vec<u8> = Vec::new();
        let result = {
            let mut out = Output::new(&mut buf, false, StyleOptions::plain());
            reg.dispatch(&config, &mut out)
        };
        (result, String::from_utf8_lossy(&buf).into_owned())
    }

    /* ---- Discovery ---- */

    #[test]
    fn discovery_skips_failing_and_panicking_candidates() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, report) = registry_with(
            vec![
                candidate("Failing", make_failing),
                candidate("ListCommand", make_list),
                candidate("Panicking", make_panicking),
                candidate("DescribeCommand", make_describe),
            ],
            &resolver,
            &bootstrap,
        );
        assert_eq!(reg.len(), 2);
        assert_eq!(report.loaded, vec!["list", "describe"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|e| matches!(
            e,
            DiscoveryError::Instantiation { .. }
        )));
        assert!(report.skipped[1].to_string().contains("panicked"));
    }

    #[test]
    fn duplicate_names_keep_first() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, report) = registry_with(
            vec![
                candidate("ListCommand", make_list),
                candidate("ListAgain", make_list_again),
            ],
            &resolver,
            &bootstrap,
        );
        assert_eq!(reg.len(), 1);
        assert!(matches!(
            &report.skipped[0],
            DiscoveryError::DuplicateName { candidate, name } if candidate == "ListAgain" && name == "list"
        ));
        // First instance kept: it still contributes its flags.
        assert_eq!(reg.merged_parameters().len(), 2);
    }

    #[test]
    fn empty_names_are_skipped() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, report) =
            registry_with(vec![candidate("Unnamed", make_unnamed)], &resolver, &bootstrap);
        assert!(reg.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn zero_commands_is_not_a_discovery_failure() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, report) = registry_with(vec![], &resolver, &bootstrap);
        assert!(report.loaded.is_empty() && report.skipped.is_empty());
        assert!(matches!(
            reg.list_commands(),
            Err(RegistryError::NoCommandsAvailable)
        ));
    }

    #[test]
    fn builtin_source_is_discoverable() {
        let mut reg = CommandRegistry::new(
            Box::new(SpyResolver::default()),
            Box::new(SpyBootstrap::default()),
        );
        let report = reg.discover(&crate::cmd::BuiltinCommands);
        assert!(report.skipped.is_empty());
        let names: Vec<String> = reg
            .list_commands()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["describe", "info", "list"]);
    }

    /* ---- Listing / help ---- */

    #[test]
    fn list_commands_sorted_by_name() {
        let (reg, _, _) = standard();
        let names: Vec<String> = reg
            .list_commands()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["describe", "list"]);
    }

    #[test]
    fn listed_names_match_dispatch_keys() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, _) = registry_with(vec![candidate("Padded", make_padded)], &resolver, &bootstrap);
        let listed = reg.list_commands().unwrap();
        assert_eq!(listed[0].name, "padded");
        let (res, _) = dispatch(&reg, Some(listed[0].name.as_str()));
        res.unwrap();
        assert!(reg.help("padded").is_some());
    }

    #[test]
    fn help_renders_usage_prefix() {
        let (reg, _, _) = standard();
        assert_eq!(
            reg.help("list").unwrap(),
            "Usage: as-explorer [...] --command list [--fake]"
        );
        assert!(reg.help("nope").is_none());
    }

    /* ---- Parameters ---- */

    #[test]
    fn merged_parameters_follow_name_then_declaration_order() {
        let (reg, _, _) = standard();
        let flags: Vec<String> = reg.merged_parameters().into_iter().map(|p| p.long).collect();
        assert_eq!(flags, vec!["describe-name", "shared", "list-root", "shared"]);
    }

    #[test]
    fn route_parameter_first_claim_wins() {
        let (mut reg, _, _) = standard();
        assert!(reg.route_parameter("shared", Some("x")));
        assert!(reg.route_parameter("list-root", Some("jdbc")));
        assert!(!reg.route_parameter("unknown-flag", Some("y")));

        let (_, text) = dispatch(&reg, Some("describe"));
        assert!(text.contains("claimed [shared=x]"), "got: {text}");
        let (_, text) = dispatch(&reg, Some("list"));
        assert!(text.contains("claimed [list-root=jdbc]"), "got: {text}");
    }

    /* ---- Dispatch ---- */

    #[test]
    fn dispatch_without_command_resolves_nothing() {
        let (reg, resolver, bootstrap) = standard();
        let (res, text) = dispatch(&reg, None);
        assert!(matches!(res, Err(RegistryError::NoCommandSpecified)));
        assert!(text.is_empty());
        assert_eq!(resolver.calls.get(), 0);
        assert_eq!(bootstrap.calls.get(), 0);

        let (res, _) = dispatch(&reg, Some("   "));
        assert!(matches!(res, Err(RegistryError::NoCommandSpecified)));
        assert_eq!(resolver.calls.get(), 0);
    }

    #[test]
    fn dispatch_unknown_command_resolves_nothing() {
        let (reg, resolver, _) = standard();
        let (res, _) = dispatch(&reg, Some("nope"));
        assert!(matches!(res, Err(RegistryError::UnknownCommand { name }) if name == "nope"));
        assert_eq!(resolver.calls.get(), 0);
    }

    #[test]
    fn dispatch_executes_selected_command() {
        let (reg, resolver, bootstrap) = standard();
        let (res, text) = dispatch(&reg, Some("list"));
        res.unwrap();
        assert!(text.starts_with("list via iiop://spy:2809"));
        assert_eq!(resolver.calls.get(), 1);
        assert_eq!(bootstrap.calls.get(), 1);
    }

    #[test]
    fn connection_failure_skips_execution_and_registry_stays_usable() {
        let resolver = SpyResolver {
            fail: true,
            ..Default::default()
        };
        let bootstrap = SpyBootstrap::default();
        let (reg, _) = registry_with(
            vec![candidate("ListCommand", make_list)],
            &resolver,
            &bootstrap,
        );
        let (res, text) = dispatch(&reg, Some("list"));
        assert!(matches!(
            res,
            Err(RegistryError::Connection(ConnectionError::Unreachable { .. }))
        ));
        assert!(text.is_empty(), "command must not run");

        let (res, _) = dispatch(&reg, Some("list"));
        assert!(res.is_err());
        assert_eq!(resolver.calls.get(), 2);
        assert_eq!(bootstrap.calls.get(), 2, "bootstrap invoked, installs once");
    }

    #[test]
    fn execution_errors_propagate_with_command_name() {
        let resolver = SpyResolver::default();
        let bootstrap = SpyBootstrap::default();
        let (reg, _) = registry_with(
            vec![candidate("Broken", make_broken)],
            &resolver,
            &bootstrap,
        );
        let (res, _) = dispatch(&reg, Some("broken"));
        match res {
            Err(RegistryError::Execution { command, source }) => {
                assert_eq!(command, "broken");
                assert!(matches!(source, ExecutionError::MissingParameter { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
