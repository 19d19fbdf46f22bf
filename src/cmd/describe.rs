use super::format::table;
use super::{Command, Output, ParameterSpec};
use crate::error::ExecutionError;
use crate::naming::ConnectionContext;

/// Looks up a single name and prints what is bound to it.
#[derive(Debug, Default)]
pub struct DescribeCommand {
    target: Option<String>,
}

impl Command for DescribeCommand {
    fn name(&self) -> &str {
        "describe"
    }

    fn description(&self) -> &str {
        "Describe the object bound to a name"
    }

    fn help(&self) -> &str {
        "--describe-name <NAME>\n\n  --describe-name <NAME>  name to look up (e.g. jdbc/ds)"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::with_value(
            "describe-name",
            "Name to look up (describe command)",
        )]
    }

    fn parse_parameter(&mut self, name: &str, value: Option<&str>) -> bool {
        if name != "describe-name" {
            return false;
        }
        self.target = value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        true
    }

    fn execute(&self, ctx: &ConnectionContext, out: &mut Output<'_>) -> Result<(), ExecutionError> {
        let name = self
            .target
            .as_deref()
            .ok_or_else(|| ExecutionError::MissingParameter {
                param: "describe-name".to_string(),
            })?;
        let binding = ctx.lookup(name)?;

        if out.is_json() {
            return out.json(&serde_json::to_value(&binding)?);
        }

        let rows = vec![
            vec!["name".to_string(), binding.name],
            vec!["class".to_string(), binding.class_name],
            vec!["value".to_string(), binding.value.unwrap_or_else(|| "-".into())],
        ];
        let rendered = table(&["FIELD", "VALUE"], &rows, out.style());
        out.line(rendered)?;
        Ok(())
    }
}
