//! Subcommand implementations.

pub mod config_cmd;
pub mod run;
pub mod serve;
pub mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use stepweave_config::AppConfig;
use stepweave_core::provider::ModelBackend;
use stepweave_workflow::{WorkflowDefinition, WorkflowRunner};

/// Entry input that `--code` / `--code-file` populate.
const CODE_INPUT: &str = "function_code";

/// Options shared by `run` and `stream`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Workflow JSON file (default: config `workflow.path`, then the bundled demo)
    #[arg(short, long)]
    pub workflow: Option<PathBuf>,

    /// Model backend: mock, echo, openai, ollama, or a configured provider
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Source code to analyze, stored as the `function_code` input
    #[arg(long, conflicts_with = "code_file")]
    pub code: Option<String>,

    /// Read the `function_code` input from a file
    #[arg(long)]
    pub code_file: Option<PathBuf>,

    /// Iteration budget for react steps without their own
    #[arg(long)]
    pub max_iters: Option<u32>,
}

/// Everything a run needs, resolved from config and flags.
pub struct Prepared {
    pub config: AppConfig,
    pub workflow: WorkflowDefinition,
    pub runner: WorkflowRunner,
}

pub fn prepare(args: &RunArgs) -> Result<Prepared, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(max_iters) = args.max_iters {
        if max_iters == 0 {
            return Err("--max-iters must be at least 1".into());
        }
        config.react.max_iters = max_iters;
    }

    let workflow = load_workflow(args, &config)?;
    let backend = build_backend(args.backend.as_deref(), &config)?;
    let runner = stepweave_gateway::build_runner(&config, backend);

    Ok(Prepared {
        config,
        workflow,
        runner,
    })
}

/// The workflow named by the flags or config, with code inputs applied.
pub fn load_workflow(
    args: &RunArgs,
    config: &AppConfig,
) -> Result<WorkflowDefinition, Box<dyn std::error::Error>> {
    let mut workflow = match args.workflow.as_ref().or(config.workflow.path.as_ref()) {
        Some(path) => WorkflowDefinition::load(path)?,
        None => WorkflowDefinition::bundled()?,
    };

    if let Some(code) = &args.code {
        workflow.set_input(CODE_INPUT, code.as_str());
    } else if let Some(path) = &args.code_file {
        let code = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        workflow.set_input(CODE_INPUT, code);
    }

    Ok(workflow)
}

pub fn build_backend(
    name: Option<&str>,
    config: &AppConfig,
) -> Result<Arc<dyn ModelBackend>, Box<dyn std::error::Error>> {
    let backend = match name {
        Some(name) => stepweave_providers::build_named(name, config),
        None => stepweave_providers::build_from_config(config),
    }
    .map_err(|e| format!("Failed to build backend: {e}"))?;
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bundled_workflow_by_default() {
        let wf = load_workflow(&RunArgs::default(), &AppConfig::default()).unwrap();
        assert_eq!(wf.steps.len(), 3);
    }

    #[test]
    fn code_flag_sets_input() {
        let args = RunArgs {
            code: Some("def f(): pass".into()),
            ..Default::default()
        };
        let wf = load_workflow(&args, &AppConfig::default()).unwrap();
        assert_eq!(wf.entry_inputs[CODE_INPUT], "def f(): pass");
    }

    #[test]
    fn code_file_sets_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fn main() {{}}").unwrap();
        let args = RunArgs {
            code_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let wf = load_workflow(&args, &AppConfig::default()).unwrap();
        assert_eq!(wf.entry_inputs[CODE_INPUT], "fn main() {}");
    }

    #[test]
    fn workflow_flag_overrides_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"steps":[{{"id":"only","template":"t"}}]}}"#).unwrap();
        let mut config = AppConfig::default();
        config.workflow.path = Some("/nonexistent/config-workflow.json".into());
        let args = RunArgs {
            workflow: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let wf = load_workflow(&args, &config).unwrap();
        assert_eq!(wf.steps[0].id, "only");
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = build_backend(Some("nope"), &AppConfig::default()).err().unwrap();
        assert!(err.to_string().contains("unknown backend"));
    }

    #[test]
    fn default_backend_is_mock() {
        let backend = build_backend(None, &AppConfig::default()).unwrap();
        assert_eq!(backend.name(), "mock");
    }
}
