use crate::cli::context::WorkspaceContext;
use crate::core::config::{loader::CONFIG_FILE_NAME, StageflowConfig};
use crate::core::error::AppError;
use crate::core::workflow::seed;
use crate::Result;
use anyhow::{anyhow, Context};
use std::fs;
use std::path::Path;

/// Handles `stageflow init`: writes a default `stageflow.toml` and publishes
/// the bundled definitions into the workspace store.
pub async fn run(workspace: &Path) -> Result<()> {
    fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;

    let config_path = workspace.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Err(anyhow!(
            "{} already exists at {}; remove it or use a different path",
            CONFIG_FILE_NAME,
            workspace.display()
        ));
    }

    let content = toml::to_string_pretty(&StageflowConfig::default())
        .context("failed to render default configuration")?;
    fs::write(&config_path, content)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let context = WorkspaceContext::load(workspace)?;
    for definition in [seed::application_workflow(), seed::recruitment_workflow()] {
        let label = format!("{} ({})", definition.id(), definition.workflow.name);
        context
            .service
            .publish_definition(definition)
            .await
            .map_err(AppError::from)?;
        println!("Published workflow {}", label);
    }

    println!("Initialized stageflow workspace at {}", workspace.display());
    println!("Next: stageflow start 1");
    Ok(())
}
