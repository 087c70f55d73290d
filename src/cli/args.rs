use crate::core::types::OutputFormat;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Published workflow id, or a path to a definition YAML file
    #[arg(value_name = "WORKFLOW_ID|FILE")]
    pub target: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Definition YAML file to validate and store
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Published workflow id, or a path to a definition YAML file
    #[arg(value_name = "WORKFLOW_ID|FILE")]
    pub target: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Published workflow id, or a path to a definition YAML file
    #[arg(value_name = "WORKFLOW_ID|FILE")]
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Published workflow id
    #[arg(value_name = "WORKFLOW_ID")]
    pub workflow_id: i64,

    /// Use this instance id instead of generating one
    #[arg(long, value_name = "ID")]
    pub instance: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AdvanceArgs {
    #[arg(value_name = "INSTANCE")]
    pub instance: String,

    /// Name of the state to apply at the current view
    #[arg(value_name = "STATE")]
    pub state: String,

    /// Who is applying the state; recorded in the trail
    #[arg(long, value_name = "ACTOR")]
    pub actor: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(value_name = "INSTANCE")]
    pub instance: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "INSTANCE")]
    pub instance: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
