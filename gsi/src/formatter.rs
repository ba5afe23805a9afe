use colored::*;
use gsi_core::{
    ConfigError, DispatchError, InitError, SchemaParseError, StubDefinition, StubSet,
};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// The one-line-per-operation listing of `gsi list`.
pub struct OperationList<'a>(pub Vec<&'a StubDefinition>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<SchemaParseError> for FormattedString {
    fn from(err: SchemaParseError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Failed to load schema:".red().bold(), err))
    }
}

impl From<ConfigError> for FormattedString {
    fn from(err: ConfigError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Invalid configuration:".red().bold(), err))
    }
}

impl From<InitError> for FormattedString {
    fn from(err: InitError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Client setup failed:".red().bold(), err))
    }
}

impl From<DispatchError> for FormattedString {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Invocation(err) => {
                let mut out = format!(
                    "{} {} status={} message={:?}",
                    "Invocation Failed:".red().bold(),
                    err.protocol,
                    err.status.yellow(),
                    err.message
                );
                if let Some(details) = err.details {
                    out.push_str("\n\n");
                    out.push_str(&FormattedString::from(details).0);
                }
                FormattedString(out)
            }
            DispatchError::Transport(err) => FormattedString(format!(
                "{} {} ({})\n\n'{}'",
                "Transport Error:".red().bold(),
                err.protocol,
                err.kind.to_string().yellow(),
                err.source
            )),
            other => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), other)),
        }
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<OperationList<'_>> for FormattedString {
    fn from(OperationList(stubs): OperationList<'_>) -> Self {
        if stubs.is_empty() {
            return FormattedString("No operations found.".yellow().to_string());
        }

        let width = stubs.iter().map(|s| s.id().len()).max().unwrap_or(0);
        let mut out = String::new();
        out.push_str("Available Operations:\n");
        for stub in stubs {
            out.push_str(&format!(
                "  - {}  {}\n",
                format!("{:width$}", stub.id()).green(),
                stub.protocol().to_string().cyan(),
            ));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<&StubDefinition> for FormattedString {
    fn from(stub: &StubDefinition) -> Self {
        let operation = &stub.operation;
        let retry = if operation.idempotent {
            "idempotent".green()
        } else {
            "not idempotent".yellow()
        };

        let mut out = format!(
            "{} [{}, {}]\n",
            operation.id.green().bold(),
            stub.protocol().to_string().cyan(),
            retry
        );
        if let Some(summary) = &operation.summary {
            out.push_str(&format!("  {}\n", summary.italic()));
        }
        out.push_str(&format!("\n  {}\n", stub.signature));
        out.push_str(&format!("  {}\n", operation.binding.to_string().cyan()));

        if !operation.params.is_empty() {
            out.push_str(&format!("\n  {}\n", "parameters:".bold()));
            for param in &operation.params {
                let required = if param.required { "required" } else { "optional" };
                out.push_str(&format!(
                    "    {} {} {} {}\n",
                    param.name.green(),
                    param.location.to_string().cyan(),
                    required,
                    param.ty.to_string().yellow()
                ));
            }
        }
        out.push_str(&format!(
            "\n  {} {}",
            "returns".cyan(),
            operation.result.to_string().yellow()
        ));

        FormattedString(out)
    }
}

impl From<&StubSet> for FormattedString {
    fn from(stubs: &StubSet) -> Self {
        if stubs.is_empty() {
            return FormattedString("No operations found.".yellow().to_string());
        }
        FormattedString(stubs.to_string().trim_end().to_string())
    }
}
