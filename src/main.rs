use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use legacy_e2e::parser::{parse_script_file, Step};
use legacy_e2e::runner::{self, RunStatus};
use legacy_e2e::utils::EngineConfig;
use legacy_e2e::workflow::{WorkflowRegistry, WorkflowResolver};
use legacy_e2e::{report, ResolveError};

#[derive(Parser)]
#[command(name = "legacy-e2e")]
#[command(version = "0.1.0")]
#[command(about = "Self-healing test execution engine for legacy web apps", long_about = None)]
struct Cli {
    /// Engine configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for run reports and screenshots
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Browser session key; runs with the same key share a browser
    #[arg(long, global = true, default_value = "default")]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a step script (JSON or YAML)
    Run {
        /// Path to the script
        script: PathBuf,

        /// Also export every run of this process to one JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Resolve a composite workflow and print it as JSON
    Resolve {
        /// Workflow id to resolve
        workflow_id: String,

        /// Directory of workflow templates
        #[arg(short, long, default_value = "./workflows")]
        workflows: PathBuf,

        /// Field value, as key=value. Can be specified multiple times.
        #[arg(short, long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,

        /// Dependency answer, as question=true|false
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, bool)>,

        /// Execute the resolved steps
        #[arg(long, default_value = "false")]
        run: bool,
    },

    /// List or search workflow templates
    Workflows {
        /// Directory of workflow templates
        #[arg(short, long, default_value = "./workflows")]
        workflows: PathBuf,

        /// Search text
        #[arg(short, long)]
        query: Option<String>,

        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_answer(s: &str) -> Result<(String, bool), String> {
    let (key, value) = parse_key_value(s)?;
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok((key, true)),
        "false" | "no" | "0" => Ok((key, false)),
        _ => Err(format!("expected true or false for '{}'", key)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }

    match cli.command {
        Commands::Run { script, export } => {
            let script = parse_script_file(&script)?;
            println!(
                "{} Running '{}' ({} steps)",
                "▶".green().bold(),
                script.test_name.cyan(),
                script.steps.len()
            );
            println!("  Output: {}", config.output_dir.display().to_string().cyan());

            let status = execute(config, &cli.session, script.steps, export.as_deref()).await?;
            exit_for(status);
        }

        Commands::Resolve {
            workflow_id,
            workflows,
            fields,
            answers,
            run,
        } => {
            let registry = WorkflowRegistry::load_dir(&workflows)?;
            let resolver = WorkflowResolver::new(registry, config.timeouts.clone());

            let values: HashMap<String, String> = fields.into_iter().collect();
            let answers: HashMap<String, bool> = answers.into_iter().collect();

            let composite = match resolver.resolve(&workflow_id, &values, &answers) {
                Ok(c) => c,
                Err(ResolveError::Validation(errors)) => {
                    eprintln!("{} Invalid field values:", "✗".red().bold());
                    for e in &errors {
                        eprintln!("  {} {}", "•".red(), e);
                    }
                    std::process::exit(2);
                }
                Err(e) => return Err(e).context("Failed to resolve workflow"),
            };

            println!("{}", serde_json::to_string_pretty(&composite)?);

            if run {
                println!(
                    "\n{} Running '{}': {} workflows, {} steps",
                    "▶".green().bold(),
                    composite.main_workflow.cyan(),
                    composite.included_workflows.len(),
                    composite.steps.len()
                );
                let status = execute(config, &cli.session, composite.steps, None).await?;
                exit_for(status);
            }
        }

        Commands::Workflows {
            workflows,
            query,
            category,
        } => {
            let registry = WorkflowRegistry::load_dir(&workflows)?;
            let entries = match query.as_deref() {
                Some(q) => registry.search(q, category.as_deref()),
                None => registry.list(category.as_deref()),
            };

            if entries.is_empty() {
                println!("{} No workflows found.", "ℹ".blue());
            }
            for entry in &entries {
                let score = entry
                    .relevance_score
                    .map(|s| format!(" ({:.2})", s))
                    .unwrap_or_default();
                println!(
                    "{} {} [{}] ~{}s{}",
                    entry.workflow_id.cyan().bold(),
                    entry.workflow_name,
                    entry.category.yellow(),
                    entry.estimated_duration,
                    score.dimmed()
                );
                if !entry.description.is_empty() {
                    println!("    {}", entry.description.dimmed());
                }
            }
            if query.is_none() && category.is_none() {
                println!("\nCategories: {}", registry.categories().join(", "));
            }
        }
    }

    Ok(())
}

async fn execute(
    config: EngineConfig,
    session: &str,
    steps: Vec<Step>,
    export: Option<&Path>,
) -> anyhow::Result<RunStatus> {
    let output_dir = config.output_dir.clone();
    let plane = Arc::new(runner::build_control_plane(config));
    let (state, _) = runner::run_steps(plane.clone(), session, steps, output_dir).await?;

    if let Some(path) = export {
        report::export_runs(plane.list(), Some(path)).await?;
    }
    Ok(state.status)
}

fn exit_for(status: RunStatus) {
    if status != RunStatus::Completed {
        std::process::exit(1);
    }
}
