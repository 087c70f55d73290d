#![allow(clippy::result_large_err)]

use crate::cli::args::{
    AdvanceArgs, GraphArgs, HistoryArgs, InspectArgs, PublishArgs, StartArgs, StatusArgs,
    ValidateArgs,
};
use crate::cli::context::WorkspaceContext;
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, OutputFormat};
use crate::core::workflow::dot::definition_to_dot;
use crate::core::workflow::inspect::inspect as inspect_snapshot;
use crate::core::workflow::schema::{load_definition, Actor, InstanceId, ViewId, WorkflowId};
use crate::core::workflow::service::{AdvanceRequest, PositionResponse};
use crate::core::workflow::snapshot::WorkflowSnapshot;
use crate::core::workflow::validator;
use crate::Result;
use serde::Serialize;
use std::path::Path;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn validate(workspace: &Path, args: ValidateArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let definition = context.load_target(&args.target).await?;
    let report = validator::validate(&definition);

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text if report.is_valid() => {
            let entry = report
                .entry_view
                .and_then(|id| definition.views.iter().find(|view| view.id == id))
                .map(|view| view.name.as_str())
                .unwrap_or("?");
            println!(
                "workflow {} ({}) is valid; entry view {}",
                definition.workflow.id, definition.workflow.name, entry
            );
        }
        OutputFormat::Text => {
            for err in &report.errors {
                match &err.location {
                    Some(location) => println!("[{}] {} ({})", err.kind, err.message, location),
                    None => println!("[{}] {}", err.kind, err.message),
                }
            }
        }
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCategory::DefinitionError,
            format!(
                "workflow {} has {} definition error(s)",
                report.workflow_id,
                report.errors.len()
            ),
        )
        .with_code("SF-DEF-001")
        .into())
    }
}

pub async fn publish(workspace: &Path, args: PublishArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let definition = load_definition(&workspace.join(&args.file))?;
    let workflow_id = definition.id();
    let name = definition.workflow.name.clone();
    context
        .service
        .publish_definition(definition)
        .await
        .map_err(AppError::from)?;
    println!("Published workflow {} ({})", workflow_id, name);
    Ok(())
}

pub async fn inspect(workspace: &Path, args: InspectArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let definition = context.load_target(&args.target).await?;
    let snapshot = WorkflowSnapshot::activate(&definition).map_err(|report| {
        AppError::new(ErrorCategory::DefinitionError, report.to_string())
            .with_code("SF-DEF-001")
            .with_suggestion("run `stageflow validate` for the full report")
    })?;
    let inspection = inspect_snapshot(&snapshot);

    match args.format {
        OutputFormat::Json => print_json(&inspection),
        OutputFormat::Text => {
            print!("{}", inspection);
            Ok(())
        }
    }
}

pub async fn graph(workspace: &Path, args: GraphArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let definition = context.load_target(&args.target).await?;
    print!("{}", definition_to_dot(&definition));
    Ok(())
}

pub async fn start(workspace: &Path, args: StartArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let record = context
        .service
        .start_instance(WorkflowId(args.workflow_id), args.instance.map(InstanceId::from))
        .await
        .map_err(AppError::from)?;
    let position = context
        .service
        .current_position(&record.id)
        .await
        .map_err(AppError::from)?;
    println!(
        "Started instance {} of workflow {} at {}",
        record.id, record.workflow_id, position.current_view_name
    );
    print_valid_states(&position);
    Ok(())
}

pub async fn advance(workspace: &Path, args: AdvanceArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let response = context
        .service
        .advance_workflow(AdvanceRequest {
            instance_id: InstanceId::from(args.instance),
            state_name: args.state,
            actor: Actor::from(args.actor),
            expected_view: None,
        })
        .await
        .map_err(AppError::from)?;

    match args.format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Text => {
            println!(
                "{} moved to {} (sequence {})",
                response.instance_id, response.current_view_name, response.sequence
            );
            if let Some(role) = &response.assigned_role {
                println!("Next: {}", role);
            }
            if response.is_terminal {
                println!("Instance concluded.");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct HistoryLine {
    sequence: u64,
    from_view: String,
    state: String,
    to_view: String,
    actor: String,
    recorded_at: String,
}

pub async fn history(workspace: &Path, args: HistoryArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let instance_id = InstanceId::from(args.instance);
    let entries = context
        .service
        .get_workflow_history(&instance_id)
        .await
        .map_err(AppError::from)?;
    let snapshot = context
        .service
        .instance_snapshot(&instance_id)
        .await
        .map_err(AppError::from)?;

    let view_name = |id: ViewId| {
        snapshot
            .view(id)
            .map(|view| view.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    let lines: Vec<HistoryLine> = entries
        .iter()
        .map(|entry| HistoryLine {
            sequence: entry.sequence,
            from_view: view_name(entry.from_view),
            state: snapshot
                .state(entry.state)
                .map(|state| state.name.clone())
                .unwrap_or_else(|| entry.state.to_string()),
            to_view: view_name(entry.to_view),
            actor: entry.actor.to_string(),
            recorded_at: entry.recorded_at.to_rfc3339(),
        })
        .collect();

    match args.format {
        OutputFormat::Json => print_json(&lines),
        OutputFormat::Text => {
            if lines.is_empty() {
                println!("No transitions recorded for {}.", instance_id);
            }
            for line in &lines {
                println!(
                    "{:>3}  {} --{}--> {}  by {} at {}",
                    line.sequence,
                    line.from_view,
                    line.state,
                    line.to_view,
                    line.actor,
                    line.recorded_at
                );
            }
            Ok(())
        }
    }
}

pub async fn status(workspace: &Path, args: StatusArgs) -> Result<()> {
    let context = WorkspaceContext::load(workspace)?;
    let position = context
        .service
        .current_position(&InstanceId::from(args.instance))
        .await
        .map_err(AppError::from)?;

    match args.format {
        OutputFormat::Json => print_json(&position),
        OutputFormat::Text => {
            println!("Instance: {}", position.instance_id);
            println!("Workflow: {}", position.workflow_id);
            println!("View:     {}", position.current_view_name);
            println!("Status:   {}", position.status.as_str());
            println!("Sequence: {}", position.sequence);
            let version = &position.definition_version;
            println!("Version:  {}", version.get(..12).unwrap_or(version));
            print_valid_states(&position);
            Ok(())
        }
    }
}

fn print_valid_states(position: &PositionResponse) {
    if !position.available_states.is_empty() {
        println!("Valid states: {}", position.available_states.join(", "));
    }
}
