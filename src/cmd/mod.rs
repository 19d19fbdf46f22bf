/*!
Pluggable inspection commands.

Every command implements [`Command`]; the registry never names concrete
types. Built-in commands are published through [`BuiltinCommands`], the
compile-time table scanned by `CommandRegistry::discover`.

Layout:
  src/cmd/
    mod.rs       (this file: contract, output sink, built-in table)
    format.rs    (table / color helpers)
    info.rs      (info)
    list.rs      (list)
    describe.rs  (describe)

Conventions:
  - Flags a command contributes are prefixed with its name (`--list-root`)
    so they stay distinct across commands.
  - `execute` writes only through [`Output`]; JSON mode emits one document.
*/

use std::io::Write;

use crate::error::ExecutionError;
use crate::naming::ConnectionContext;
use crate::registry::{Candidate, CommandSource};

pub mod describe;
pub mod format;
pub mod info;
pub mod list;

use format::StyleOptions;

/// Namespace scanned for built-in commands.
pub const COMMAND_NAMESPACE: &str = "commands";

/// A long flag a command wants the outer CLI to accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub long: String,
    pub takes_value: bool,
    pub help: String,
}

impl ParameterSpec {
    /// Boolean switch (`--flag`).
    pub fn switch(long: &str, help: &str) -> Self {
        Self {
            long: long.to_string(),
            takes_value: false,
            help: help.to_string(),
        }
    }

    /// Flag carrying a value (`--flag VALUE`).
    pub fn with_value(long: &str, help: &str) -> Self {
        Self {
            long: long.to_string(),
            takes_value: true,
            help: help.to_string(),
        }
    }
}

/// Contract of one pluggable operation.
pub trait Command {
    /// Unique dispatch key and `--command` value.
    fn name(&self) -> &str;

    /// One-line summary for listings.
    fn description(&self) -> &str;

    /// Extended usage text (appended after the usage prefix).
    fn help(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    /// Claim a flag/value pair. Returns true when the flag belongs to this command.
    fn parse_parameter(&mut self, _name: &str, _value: Option<&str>) -> bool {
        false
    }

    fn execute(&self, ctx: &ConnectionContext, out: &mut Output<'_>) -> Result<(), ExecutionError>;
}

/// Where command results go.
pub struct Output<'a> {
    writer: &'a mut dyn Write,
    json: bool,
    style: StyleOptions,
}

impl<'a> Output<'a> {
    pub fn new(writer: &'a mut dyn Write, json: bool, style: StyleOptions) -> Self {
        Self {
            writer,
            json,
            style,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn style(&self) -> &StyleOptions {
        &self.style
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> std::io::Result<()> {
        writeln!(self.writer, "{}", text.as_ref())
    }

    pub fn json(&mut self, value: &serde_json::Value) -> Result<(), ExecutionError> {
        let rendered = serde_json::to_string_pretty(value)?;
        self.line(rendered)?;
        Ok(())
    }
}

fn boxed<C: Command + Default + 'static>() -> anyhow::Result<Box<dyn Command>> {
    Ok(Box::new(C::default()))
}

static BUILTIN: &[Candidate] = &[
    Candidate {
        type_name: "DescribeCommand",
        construct: boxed::<describe::DescribeCommand>,
    },
    Candidate {
        type_name: "InfoCommand",
        construct: boxed::<info::InfoCommand>,
    },
    Candidate {
        type_name: "ListCommand",
        construct: boxed::<list::ListCommand>,
    },
];

/// Compile-time command table.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCommands;

impl CommandSource for BuiltinCommands {
    fn candidates(&self, namespace: &str) -> Vec<Candidate> {
        if namespace == COMMAND_NAMESPACE {
            BUILTIN.to_vec()
        } else {
            Vec::new()
        }
    }
}
