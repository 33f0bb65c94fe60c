//! Grant Workflow CLI
//!
//! Lints workflow and form configuration before it is deployed.
//!
//! # Usage
//!
//! ```bash
//! # Check every workflow in GRANT_WORKFLOW_DIR (or --dir)
//! grant-workflow check-workflows
//!
//! # Check a form schema for a given purpose
//! grant-workflow check-form config/forms/application.yaml --form application
//!
//! # Print a workflow's phases and actions
//! grant-workflow show double_stage --format json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use grant_workflow::{EngineConfig, FieldSchema, FormKind, OutcomeTable, PhaseGraph, WorkflowLoader, WorkflowRegistry};

#[derive(Parser)]
#[command(name = "grant-workflow")]
#[command(version)]
#[command(about = "Lint and inspect grant workflow configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and lint every workflow definition
    CheckWorkflows {
        /// Workflow directory (defaults to GRANT_WORKFLOW_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Outcome table to check determination phases against
        #[arg(long)]
        outcomes: Option<PathBuf>,
    },
    /// Validate a form schema file
    CheckForm {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "application")]
        form: FormArg,
    },
    /// Print a workflow's stages, phases and actions
    Show {
        workflow: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormArg {
    Application,
    Review,
    Determination,
    Project,
}

impl From<FormArg> for FormKind {
    fn from(arg: FormArg) -> Self {
        match arg {
            FormArg::Application => FormKind::Application,
            FormArg::Review => FormKind::Review,
            FormArg::Determination => FormKind::Determination,
            FormArg::Project => FormKind::Project,
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,grant_workflow=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let result = match cli.command {
        Commands::CheckWorkflows { dir, outcomes } => {
            cmd_check_workflows(dir.unwrap_or(config.workflow_dir), outcomes, cli.format)
        }
        Commands::CheckForm { file, form } => cmd_check_form(file, form.into(), cli.format),
        Commands::Show { workflow, dir } => {
            cmd_show(&workflow, dir.unwrap_or(config.workflow_dir), cli.format)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_check_workflows(dir: PathBuf, outcomes: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let definitions = WorkflowLoader::load_from_dir(&dir)
        .with_context(|| format!("loading workflows from {}", dir.display()))?;
    if definitions.is_empty() {
        bail!("no workflow definitions found in {}", dir.display());
    }
    let table = match outcomes {
        Some(path) => WorkflowLoader::load_outcomes_from_file(&path)
            .with_context(|| format!("loading outcome table {}", path.display()))?,
        None => OutcomeTable::standard(),
    };

    let mut report = Vec::new();
    let mut names: Vec<_> = definitions.keys().cloned().collect();
    names.sort();
    for name in names {
        let Some(definition) = definitions.get(&name) else {
            continue;
        };
        let graph = PhaseGraph::new(definition.clone()).with_context(|| format!("indexing {}", name))?;
        let mut issues: Vec<String> = graph.validate().iter().map(ToString::to_string).collect();

        for (_, phase) in graph.phases() {
            for action in &phase.actions {
                let mapped = table.outcome_of(&action.name).is_some();
                let looks_like_determination = ["accepted", "rejected", "more_info"]
                    .iter()
                    .any(|suffix| action.name.ends_with(suffix));
                if looks_like_determination && !mapped {
                    issues.push(format!("{}.{} has no outcome mapping", phase.name, action.name));
                }
            }
        }
        report.push(serde_json::json!({ "workflow": name, "issues": issues }));
    }

    let failed = report
        .iter()
        .any(|r| r["issues"].as_array().is_some_and(|i| !i.is_empty()));
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for entry in &report {
                let issues = entry["issues"].as_array().cloned().unwrap_or_default();
                if issues.is_empty() {
                    println!("ok    {}", entry["workflow"].as_str().unwrap_or_default());
                } else {
                    println!("FAIL  {}", entry["workflow"].as_str().unwrap_or_default());
                    for issue in issues {
                        println!("      - {}", issue.as_str().unwrap_or_default());
                    }
                }
            }
        }
    }

    if failed {
        bail!("workflow configuration has issues");
    }
    Ok(())
}

fn cmd_check_form(file: PathBuf, form: FormKind, format: OutputFormat) -> Result<()> {
    let schema = FieldSchema::load_from_file(&file)
        .with_context(|| format!("loading form {}", file.display()))?;
    let problems: Vec<String> = match schema.validate_schema(form) {
        Ok(()) => Vec::new(),
        Err(e) => e.problems.iter().map(ToString::to_string).collect(),
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "file": file.display().to_string(),
                "fields": schema.fields.len(),
                "fingerprint": schema.fingerprint(),
                "problems": problems,
            }))?
        ),
        OutputFormat::Text => {
            println!("{} ({} fields, {})", file.display(), schema.fields.len(), schema.fingerprint());
            for problem in &problems {
                println!("  - {}", problem);
            }
        }
    }

    if !problems.is_empty() {
        bail!("form schema has {} problem(s)", problems.len());
    }
    Ok(())
}

fn cmd_show(workflow: &str, dir: PathBuf, format: OutputFormat) -> Result<()> {
    let registry = WorkflowRegistry::load_from_dir(&dir)?;
    let graph = registry.get(workflow)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(graph.definition())?),
        OutputFormat::Text => {
            println!("{} (v{})", graph.name(), graph.definition().version);
            for stage in &graph.definition().stages {
                println!("  {}", stage.name);
                for phase in &stage.phases {
                    let marker = phase.outcome.map(|o| format!(" [{}]", o)).unwrap_or_default();
                    println!("    {}{}", phase.name, marker);
                    for action in &phase.actions {
                        println!("      -> {} ({:?})", action.name, action.target);
                    }
                }
            }
        }
    }
    Ok(())
}
