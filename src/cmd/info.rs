use super::format::table;
use super::{Command, Output};
use crate::error::ExecutionError;
use crate::naming::ConnectionContext;

/// Prints where the current context points.
#[derive(Debug, Default)]
pub struct InfoCommand;

impl Command for InfoCommand {
    fn name(&self) -> &str {
        "info"
    }

    fn description(&self) -> &str {
        "Show vendor, provider URL and principal of the connection"
    }

    fn help(&self) -> &str {
        "[--json]\n\nConnects to the server and prints the vendor profile, the provider URL\nand the authenticated principal (if any). Takes no parameters."
    }

    fn execute(&self, ctx: &ConnectionContext, out: &mut Output<'_>) -> Result<(), ExecutionError> {
        if out.is_json() {
            return out.json(&serde_json::json!({
                "vendor": ctx.vendor(),
                "provider_url": ctx.provider_url(),
                "principal": ctx.principal(),
            }));
        }

        let rows = vec![
            vec!["vendor".to_string(), ctx.vendor().to_string()],
            vec!["provider_url".to_string(), ctx.provider_url().to_string()],
            vec![
                "principal".to_string(),
                ctx.principal().unwrap_or("(anonymous)").to_string(),
            ],
        ];
        let rendered = table(&["FIELD", "VALUE"], &rows, out.style());
        out.line(rendered)?;
        Ok(())
    }
}
