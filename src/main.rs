//! `cellbase [--settings FILE] [--type NAME] [--id ID] <rows.jsonl>`
//!
//! Loads every line of a JSON lines file into a new dataset, commits it and
//! prints the resulting status. A line holds either one row object or an array
//! of rows, in any of the shapes [`cellbase::binding::JsonBinding::record_rows`] accepts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::ExitCode;

use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cellbase::binding::JsonBinding;
use cellbase::dataset::Dataset;
use cellbase::error::{CellbaseError, Result};
use cellbase::registry::DatasetTypeRegistry;
use cellbase::settings::Settings;

#[derive(Debug, Default)]
struct Arguments {
    settings: Option<String>,
    type_name: Option<String>,
    id: Option<String>,
    input: Option<String>,
}

fn parse_arguments() -> Result<Arguments> {
    let mut arguments = Arguments::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value_of = |flag: &str| {
            args.next().ok_or_else(|| {
                CellbaseError::InvalidArgument(format!("{} expects a value", flag))
            })
        };
        match arg.as_str() {
            "--settings" => arguments.settings = Some(value_of("--settings")?),
            "--type" => arguments.type_name = Some(value_of("--type")?),
            "--id" => arguments.id = Some(value_of("--id")?),
            flag if flag.starts_with("--") => {
                return Err(CellbaseError::InvalidArgument(format!(
                    "unknown option {}",
                    flag
                )));
            }
            _ if arguments.input.is_none() => arguments.input = Some(arg),
            _ => {
                return Err(CellbaseError::InvalidArgument(
                    "only one input file can be given".into(),
                ));
            }
        }
    }
    Ok(arguments)
}

fn load(dataset: &Dataset, input: &str) -> Result<u64> {
    let binding = JsonBinding::new(dataset);
    let file = File::open(input)
        .map_err(|e| CellbaseError::InvalidArgument(format!("cannot open {}: {}", input, e)))?;
    let mut lines = 0;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .map_err(|e| CellbaseError::InvalidArgument(format!("cannot read {}: {}", input, e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            CellbaseError::InvalidArgument(format!("line {}: {}", number + 1, e))
        })?;
        let rows = match value {
            Value::Array(_) => value,
            row => Value::Array(vec![row]),
        };
        binding.record_rows(&rows).map_err(|e| match e {
            CellbaseError::InvalidArgument(message) => {
                CellbaseError::InvalidArgument(format!("line {}: {}", number + 1, message))
            }
            other => other,
        })?;
        lines += 1;
    }
    Ok(lines)
}

fn run(arguments: Arguments, settings: Settings) -> Result<()> {
    let input = arguments.input.ok_or_else(|| {
        CellbaseError::InvalidArgument(
            "usage: cellbase [--settings FILE] [--type NAME] [--id ID] <rows.jsonl>".into(),
        )
    })?;
    let registry = DatasetTypeRegistry::builtin();
    let config = settings.dataset_config(arguments.type_name.as_deref(), arguments.id.as_deref());
    let dataset = Dataset::create(&registry, config)?;
    let lines = load(&dataset, &input)?;
    info!(dataset = %dataset.id(), lines, input = %input, "input loaded");
    dataset.commit()?;
    println!("{}", serde_json::to_string_pretty(&dataset.status()?)?);
    Ok(())
}

fn main() -> ExitCode {
    let arguments = match parse_arguments() {
        Ok(arguments) => arguments,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    let settings = match Settings::load(arguments.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(arguments, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "cellbase failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
