use std::collections::BTreeMap;

use serde_json::Value;
use stepform_core::{
    FieldAddress, FormState, RenderPayload, ValidationError, render_json_ui, render_text,
};

/// Controls which bits of state the walk prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Step path and final payload only.
    Clean,
    /// Every step's fields, flags and errors.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Prints the progress of a non-interactive workflow walk.
pub struct WalkPresenter {
    verbosity: Verbosity,
    format: OutputFormat,
    path: Vec<String>,
}

impl WalkPresenter {
    pub fn new(verbosity: Verbosity, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            path: Vec::new(),
        }
    }

    pub fn show_step(&mut self, step_id: &str, payload: &RenderPayload) {
        self.path.push(step_id.to_string());
        if !self.verbosity.is_verbose() {
            return;
        }
        match self.format {
            OutputFormat::Text => println!("{}\n", render_text(payload)),
            OutputFormat::Json => match serde_json::to_string_pretty(&render_json_ui(payload)) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize step payload: {}", err),
            },
        }
    }

    pub fn show_blocked(&self, step_id: &str, errors: &[(String, ValidationError)]) {
        eprintln!("Step '{}' is incomplete:", step_id);
        for (address, error) in errors {
            eprintln!("  {} - {} ({})", address, error.message, error.code);
        }
    }

    pub fn show_skip(&self, step_id: &str) {
        if self.verbosity.is_verbose() {
            println!("Skipping '{}'", step_id);
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn show_completion(&self, payload: &Value) {
        match self.format {
            OutputFormat::Text => {
                println!("Path: {}", self.path.join(" > "));
                match serde_json::to_string_pretty(payload) {
                    Ok(pretty) => println!("Submitted:\n{}", pretty),
                    Err(err) => eprintln!("Failed to serialize submission: {}", err),
                }
            }
            OutputFormat::Json => {
                let summary = serde_json::json!({ "path": self.path, "submitted": payload });
                match serde_json::to_string_pretty(&summary) {
                    Ok(pretty) => println!("{}", pretty),
                    Err(err) => eprintln!("Failed to serialize submission: {}", err),
                }
            }
        }
    }
}

/// Errors keyed by a consumer-facing address (`items[0].name` instead of the stored item key).
pub fn readable_errors(
    form: &FormState,
    errors: &BTreeMap<String, Vec<ValidationError>>,
) -> Vec<(String, ValidationError)> {
    errors
        .iter()
        .flat_map(|(address, list)| {
            let readable = readable_address(form, address);
            list.iter()
                .map(move |error| (readable.clone(), error.clone()))
        })
        .collect()
}

pub fn readable_address(form: &FormState, address: &str) -> String {
    match FieldAddress::parse(address) {
        Ok(FieldAddress::Item {
            repeatable,
            key,
            field,
        }) => match form
            .registration(&repeatable)
            .and_then(|registration| registration.index_of(key))
        {
            Some(index) => format!("{}[{}].{}", repeatable, index, field),
            None => address.to_string(),
        },
        _ => address.to_string(),
    }
}
