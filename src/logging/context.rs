use crate::cli::Command;
use crate::core::types::OutputFormat;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// A person reading text output in a terminal.
    Interactive,
    /// Another program consuming machine-readable output (JSON or DOT).
    Scripted,
}

impl ExecutionContext {
    /// Returns `true` when console sinks should be disabled.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Scripted)
    }
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    let format = match command {
        Command::Graph(_) => return ExecutionContext::Scripted,
        Command::Validate(args) => args.format,
        Command::Advance(args) => args.format,
        Command::History(args) => args.format,
        Command::Status(args) => args.format,
        Command::Inspect(args) => args.format,
        Command::Init | Command::Publish(_) | Command::Start(_) => OutputFormat::Text,
    };
    match format {
        OutputFormat::Json => ExecutionContext::Scripted,
        OutputFormat::Text => ExecutionContext::Interactive,
    }
}
