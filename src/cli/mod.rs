pub mod args;
pub mod commands;
pub mod context;
pub mod init;

pub use args::{
    AdvanceArgs, GraphArgs, HistoryArgs, InspectArgs, PublishArgs, StartArgs, StatusArgs,
    ValidateArgs,
};
pub use context::WorkspaceContext;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
WORKFLOW COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "stageflow")]
#[command(version = crate::VERSION)]
#[command(about = "Stage-graph workflow engine for multi-actor processes")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: init a workspace, publish a definition, start an instance, then advance it state by state."
)]
pub struct Args {
    /// Workspace holding stageflow.toml and the .stageflow/ directory
    #[arg(long, global = true, value_name = "WORKSPACE", default_value = ".")]
    pub path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(
        about = "Create stageflow.toml and publish the bundled definitions",
        after_help = "Example:\n    stageflow --path ./hiring init"
    )]
    Init,
    #[command(
        about = "Check a definition for graph errors",
        long_about = "Validate reports every defect that would stop a definition from activating: entry point, foreign or unknown references, ambiguous routes, unreachable views. Exits non-zero when any are found.",
        after_help = "Examples:\n    stageflow validate 1\n    stageflow validate ./hiring.yaml --format json"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Validate and store a definition",
        long_about = "Publish replaces the stored definition with the same workflow id. Running instances follow the new graph from their current view onward.",
        after_help = "Example:\n    stageflow publish ./hiring.yaml"
    )]
    Publish(PublishArgs),
    #[command(
        about = "Summarize entry, terminal views, cycles and valid states",
        after_help = "Example:\n    stageflow inspect 2"
    )]
    Inspect(InspectArgs),
    #[command(
        about = "Print the definition as Graphviz DOT",
        after_help = "Example:\n    stageflow graph 1 | dot -Tsvg > workflow.svg"
    )]
    Graph(GraphArgs),
    #[command(
        about = "Start an instance at the workflow's entry view",
        after_help = "Example:\n    stageflow start 2 --instance cand-42"
    )]
    Start(StartArgs),
    #[command(
        about = "Apply a state to an instance",
        long_about = "Advance resolves the route for the instance's current view and the given state, appends a trail entry and reports who acts next.",
        after_help = "Example:\n    stageflow advance cand-42 SUBMIT --actor alice"
    )]
    Advance(AdvanceArgs),
    #[command(
        about = "Show an instance's transition trail",
        after_help = "Example:\n    stageflow history cand-42 --format json"
    )]
    History(HistoryArgs),
    #[command(
        about = "Show an instance's current view and valid states",
        after_help = "Example:\n    stageflow status cand-42"
    )]
    Status(StatusArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    let workspace = args.path;
    match args.command {
        Command::Init => init::run(&workspace).await,
        Command::Validate(validate_args) => commands::validate(&workspace, validate_args).await,
        Command::Publish(publish_args) => commands::publish(&workspace, publish_args).await,
        Command::Inspect(inspect_args) => commands::inspect(&workspace, inspect_args).await,
        Command::Graph(graph_args) => commands::graph(&workspace, graph_args).await,
        Command::Start(start_args) => commands::start(&workspace, start_args).await,
        Command::Advance(advance_args) => commands::advance(&workspace, advance_args).await,
        Command::History(history_args) => commands::history(&workspace, history_args).await,
        Command::Status(status_args) => commands::status(&workspace, status_args).await,
    }
}
