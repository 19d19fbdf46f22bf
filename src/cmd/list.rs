/*!
`list` - enumerate bindings of the naming tree.

Flags:
  --list-root <NAME>   context to start from (default: initial context)
  --list-recursive     descend into nested contexts (bounded by MAX_DEPTH)

JSON shape:
{
  "root": "jdbc",
  "count": 2,
  "entries": [ { "name": "jdbc/ds", "class_name": "...", "is_context": false } ]
}
*/

use serde::Serialize;
use tracing::debug;

use super::format::{Role, color, table};
use super::{Command, Output, ParameterSpec};
use crate::error::{ExecutionError, NamingError};
use crate::naming::ConnectionContext;

/// Deepest level visited by `--list-recursive`.
pub const MAX_DEPTH: usize = 8;

#[derive(Debug, Default)]
pub struct ListCommand {
    root: String,
    recursive: bool,
}

#[derive(Debug, Serialize)]
struct ListedEntry {
    name: String,
    class_name: String,
    is_context: bool,
}

fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

impl ListCommand {
    fn walk(
        &self,
        ctx: &ConnectionContext,
        path: &str,
        depth: usize,
        acc: &mut Vec<ListedEntry>,
    ) -> Result<(), NamingError> {
        for pair in ctx.list(path)? {
            let full = join(path, &pair.name);
            let descend = self.recursive && pair.is_context && depth + 1 < MAX_DEPTH;
            acc.push(ListedEntry {
                name: full.clone(),
                class_name: pair.class_name,
                is_context: pair.is_context,
            });
            if descend {
                self.walk(ctx, &full, depth + 1, acc)?;
            } else if self.recursive && pair.is_context {
                debug!(context = %full, "Depth limit reached; not descending");
            }
        }
        Ok(())
    }
}

impl Command for ListCommand {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List bindings of the naming tree"
    }

    fn help(&self) -> &str {
        "[--list-root <NAME>] [--list-recursive]\n\n  --list-root <NAME>  context to list (default: initial context)\n  --list-recursive    descend into nested contexts"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::with_value("list-root", "Context to list (list command)"),
            ParameterSpec::switch("list-recursive", "Descend into nested contexts (list command)"),
        ]
    }

    fn parse_parameter(&mut self, name: &str, value: Option<&str>) -> bool {
        match name {
            "list-root" => {
                self.root = value.unwrap_or("").trim().trim_matches('/').to_string();
                true
            }
            "list-recursive" => {
                self.recursive = true;
                true
            }
            _ => false,
        }
    }

    fn execute(&self, ctx: &ConnectionContext, out: &mut Output<'_>) -> Result<(), ExecutionError> {
        let mut entries = Vec::new();
        self.walk(ctx, &self.root, 0, &mut entries)?;

        if out.is_json() {
            return out.json(&serde_json::json!({
                "root": self.root,
                "count": entries.len(),
                "entries": entries,
            }));
        }

        let shown_root = if self.root.is_empty() { "/" } else { self.root.as_str() };
        out.line(format!("Bindings under {shown_root} ({})", entries.len()))?;
        if entries.is_empty() {
            let none = color(Role::Dim, "(none)", out.style());
            out.line(none)?;
            return Ok(());
        }
        let rows: Vec<Vec<String>> = entries
            .into_iter()
            .map(|e| {
                let name = if e.is_context {
                    format!("{}/", e.name)
                } else {
                    e.name
                };
                vec![name, e.class_name]
            })
            .collect();
        let rendered = table(&["NAME", "CLASS"], &rows, out.style());
        out.line(rendered)?;
        Ok(())
    }
}
