mod logging;
mod walk;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stepform_core::{
    FileStorage, FormSpec, FormState, NavigationError, SpecIssue, Transition, TracingSink,
    Workflow, WorkflowSpec, build_render_payload, build_workflow_payload, form_schema,
    render_json_ui, workflow_schema,
};

use logging::{LogConfig, init_logging};
use walk::{OutputFormat, Verbosity, WalkPresenter, readable_errors};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Drive stepform forms and workflows from JSON files",
    long_about = "Validates values against form definitions, normalizes nested values, walks multi-step workflows non-interactively and prints configuration schemas"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaKind {
    Form,
    Workflow,
}

#[derive(Subcommand)]
enum Command {
    /// Validate nested values against a form definition.
    Validate {
        /// Path to the FormSpec JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Path to the nested values JSON.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Output mode for the result.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Load values into a form and print them back in normalized shape.
    Structure {
        /// Path to the FormSpec JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Path to the nested values JSON.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
    },
    /// Walk a workflow from first to last visible step and print the submitted data.
    Walk {
        /// Path to the WorkflowSpec JSON.
        #[arg(long, value_name = "WORKFLOW")]
        workflow: PathBuf,
        /// Initial data keyed by step id.
        #[arg(long, value_name = "DATA")]
        data: Option<PathBuf>,
        /// Directory for workflow snapshots; enables autosave.
        #[arg(long, value_name = "DIR")]
        state_dir: Option<PathBuf>,
        /// Continue from the snapshot in the state directory, if any.
        #[arg(long, requires = "state_dir")]
        resume: bool,
        /// Print every step's fields as the walk proceeds.
        #[arg(long)]
        details: bool,
        /// Output mode for step details and the submission.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the JSON Schema of a configuration document.
    Schema {
        #[arg(long, value_enum, default_value_t = SchemaKind::Form)]
        kind: SchemaKind,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&LogConfig::from_verbosity(cli.verbose)) {
        eprintln!("Failed to initialize logging: {}", err);
    }
    match cli.command {
        Command::Validate {
            spec,
            values,
            format,
        } => run_validate(&spec, &values, format),
        Command::Structure { spec, values } => run_structure(&spec, &values),
        Command::Walk {
            workflow,
            data,
            state_dir,
            resume,
            details,
            format,
        } => run_walk(WalkArgs {
            workflow,
            data,
            state_dir,
            resume,
            verbosity: Verbosity::from_verbose(details),
            format,
        }),
        Command::Schema { kind } => run_schema(kind),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let parsed = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err))?;
    Ok(parsed)
}

fn report_issues(issues: &[SpecIssue]) {
    for issue in issues {
        tracing::warn!(path = %issue.path, "{}", issue.message);
        eprintln!("Spec issue: {}", issue);
    }
}

fn run_validate(spec_path: &Path, values_path: &Path, format: OutputFormat) -> CliResult<()> {
    let spec: FormSpec = read_json(spec_path)?;
    let values: Value = read_json(values_path)?;
    report_issues(&spec.check());

    let mut form = FormState::with_defaults(spec, values);
    let valid = form.validate();
    match format {
        OutputFormat::Text => {
            println!(
                "Validation result: {}",
                if valid { "valid" } else { "invalid" }
            );
            let errors = readable_errors(&form, &form.errors());
            if !errors.is_empty() {
                println!("Errors:");
                for (address, error) in errors {
                    println!("  {} - {} ({})", address, error.message, error.code);
                }
            }
        }
        OutputFormat::Json => {
            let ui = render_json_ui(&build_render_payload(&form));
            println!("{}", serde_json::to_string_pretty(&ui)?);
        }
    }

    if valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn run_structure(spec_path: &Path, values_path: &Path) -> CliResult<()> {
    let spec: FormSpec = read_json(spec_path)?;
    let values: Value = read_json(values_path)?;
    let form = FormState::with_defaults(spec, values);
    println!("{}", serde_json::to_string_pretty(&form.values())?);
    Ok(())
}

struct WalkArgs {
    workflow: PathBuf,
    data: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    resume: bool,
    verbosity: Verbosity,
    format: OutputFormat,
}

fn run_walk(args: WalkArgs) -> CliResult<()> {
    let spec: WorkflowSpec = read_json(&args.workflow)?;
    report_issues(&spec.check());
    if spec.steps.is_empty() {
        return Err(format!("workflow '{}' has no steps", spec.id).into());
    }
    let data: Value = match &args.data {
        Some(path) => read_json(path)?,
        None => Value::Object(Default::default()),
    };

    let submitted = Rc::new(RefCell::new(None::<Value>));
    let sink = submitted.clone();
    let step_count = spec.steps.len();
    let mut workflow = Workflow::with_data(spec, data)
        .with_analytics(TracingSink)
        .on_complete(move |payload: &Value| {
            *sink.borrow_mut() = Some(payload.clone());
            Ok(())
        });
    if let Some(dir) = &args.state_dir {
        workflow = workflow.with_storage(FileStorage::new(dir));
    }
    if args.resume && workflow.restore()? {
        tracing::info!(
            step = workflow.current_step_index(),
            "resumed from snapshot"
        );
    }

    let mut presenter = WalkPresenter::new(args.verbosity, args.format);
    workflow.start();
    // Each step is entered at most once on a forward walk.
    for _ in 0..=step_count {
        let Some(step_id) = workflow.current_step().map(|step| step.id.clone()) else {
            break;
        };
        presenter.show_step(&step_id, &build_workflow_payload(&workflow));

        let result = match workflow.go_next() {
            Err(NavigationError::Invalid { errors, .. }) if workflow.can_skip() => {
                tracing::info!(step = %step_id, errors = errors.len(), "skipping incomplete step");
                presenter.show_skip(&step_id);
                workflow.skip_step()
            }
            Err(NavigationError::Invalid { step, errors }) => {
                let readable = workflow
                    .current_form()
                    .map(|form| readable_errors(form, &errors))
                    .unwrap_or_default();
                presenter.show_blocked(&step, &readable);
                workflow.abandon();
                return Err(format!("workflow stopped at step '{}'", step).into());
            }
            other => other,
        };

        match result? {
            Transition::Moved { .. } => continue,
            Transition::Submitted => {
                let payload = submitted.borrow().clone().unwrap_or(Value::Null);
                presenter.show_completion(&payload);
                tracing::debug!(path = ?presenter.path(), "walk finished");
                return Ok(());
            }
        }
    }
    workflow.abandon();
    Err("workflow did not reach submission".into())
}

fn run_schema(kind: SchemaKind) -> CliResult<()> {
    let schema = match kind {
        SchemaKind::Form => form_schema(),
        SchemaKind::Workflow => workflow_schema(),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
