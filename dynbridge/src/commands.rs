//! # Commands
//!
//! - `inspect <manifest>` - Print the module's packages and declared surface
//! - `verify <manifest>` - Check platform and library hash
//! - `call <manifest> <function> [json-args...]` - Call one function
//!
//! Global flags `--log-level <LEVEL>` and `--log-format <text|json>` may
//! appear anywhere on the line.

use crate::json;
use crate::logging::{LogFormat, LogLevel, LogSettings};
use artifact::{read_manifest, ArtifactError, ArtifactManifest};
use bridge_client::{BridgeError, Platform};
use package_runtime::{Outcome, PackageHandle, RuntimeError, RuntimeRegistry};
use schema_index::Schema;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Command-line error types
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("Argument {index} is not valid JSON: {reason}")]
    InvalidJson { index: usize, reason: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Inspect { manifest: PathBuf },
    Verify { manifest: PathBuf },
    Call {
        manifest: PathBuf,
        function: String,
        args: Vec<rmpv::Value>,
    },
    Help,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: Command,
    pub log: LogSettings,
}

/// Parses arguments, excluding the program name.
pub fn parse_args(args: &[String]) -> Result<Invocation, CliError> {
    let mut log = LogSettings::default();
    let mut positional = Vec::new();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--log-level" => {
                let value = flag_value(args, &mut i, "--log-level")?;
                log.level = Some(LogLevel::parse(value).ok_or_else(|| CliError::InvalidValue {
                    flag: "--log-level".to_string(),
                    value: value.to_string(),
                })?);
            }
            "--log-format" => {
                let value = flag_value(args, &mut i, "--log-format")?;
                log.format = Some(LogFormat::parse(value).ok_or_else(|| CliError::InvalidValue {
                    flag: "--log-format".to_string(),
                    value: value.to_string(),
                })?);
            }
            "--help" | "-h" => {
                return Ok(Invocation {
                    command: Command::Help,
                    log,
                });
            }
            other if other.starts_with("--") => {
                return Err(CliError::UnknownOption(other.to_string()));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None => return Err(CliError::MissingArgument("command".to_string())),
        Some("inspect") => Command::Inspect {
            manifest: required(positional.next(), "manifest")?.into(),
        },
        Some("verify") => Command::Verify {
            manifest: required(positional.next(), "manifest")?.into(),
        },
        Some("call") => {
            let manifest = required(positional.next(), "manifest")?.into();
            let function = required(positional.next(), "function")?;
            let args: Vec<rmpv::Value> = positional
                .enumerate()
                .map(|(index, raw)| {
                    serde_json::from_str(&raw)
                        .map(|parsed| json::to_value(&parsed))
                        .map_err(|err| CliError::InvalidJson {
                            index,
                            reason: err.to_string(),
                        })
                })
                .collect::<Result<_, CliError>>()?;
            return Ok(Invocation {
                command: Command::Call {
                    manifest,
                    function,
                    args,
                },
                log,
            });
        }
        Some(other) => return Err(CliError::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = positional.next() {
        return Err(CliError::UnknownOption(extra));
    }
    Ok(Invocation { command, log })
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, CliError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| CliError::MissingArgument(format!("value for {}", flag)))
}

fn required(value: Option<String>, what: &str) -> Result<String, CliError> {
    value.ok_or_else(|| CliError::MissingArgument(what.to_string()))
}

/// Runs a command, writing its report to `out`.
pub fn run(command: &Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Inspect { manifest } => inspect(&read_manifest(manifest)?, out),
        Command::Verify { manifest } => {
            let manifest = read_manifest(manifest)?;
            let host = Platform::host()?;
            manifest.verify_library(&host)?;
            info!(target: "cli.verify", module = %manifest.module, "library verified");
            writeln!(
                out,
                "ok {}@{} {} {}",
                manifest.module,
                manifest.version,
                manifest.platform(),
                manifest.library.sha256
            )?;
            Ok(())
        }
        Command::Call {
            manifest,
            function,
            args,
        } => {
            let manifest = read_manifest(manifest)?;
            let pkg = PackageHandle::from_manifest(&manifest, &manifest.module, RuntimeRegistry::global())?;
            let outcome = pkg.call(function, args.clone())?;
            writeln!(out, "{}", render_outcome(&outcome))?;
            Ok(())
        }
        Command::Help => {
            write!(out, "{}", usage("dynbridge"))?;
            Ok(())
        }
    }
}

/// JSON form of a call result; handles print as `{"object", "id"}`.
fn render_outcome(outcome: &Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Value(value) => json::from_value(value),
        Outcome::Object(handle) => serde_json::json!({
            "object": handle.type_name(),
            "id": handle.id(),
        }),
        Outcome::Tuple(items) => serde_json::Value::Array(items.iter().map(render_outcome).collect()),
    }
}

fn inspect(manifest: &ArtifactManifest, out: &mut dyn Write) -> Result<(), CliError> {
    writeln!(out, "module   {}@{}", manifest.module, manifest.version)?;
    writeln!(out, "platform {}", manifest.platform())?;
    writeln!(out, "library  {}", manifest.library_path().display())?;

    let schema = Schema::from_manifest(manifest.schema.as_ref());
    let mut packages: Vec<String> = manifest.packages.clone();
    for pkg in schema.packages() {
        if !packages.iter().any(|p| p == pkg) {
            packages.push(pkg.to_string());
        }
    }
    if !packages.iter().any(|p| *p == manifest.module) {
        packages.insert(0, manifest.module.clone());
    }

    for pkg in &packages {
        writeln!(out)?;
        writeln!(out, "package {}", pkg)?;
        for (name, schema) in schema.structs(pkg) {
            if schema.is_opaque() {
                writeln!(out, "  type {} (opaque)", name)?;
                continue;
            }
            writeln!(out, "  type {} struct", name)?;
            for field in schema.fields() {
                let marker = if field.required { "" } else { " (optional)" };
                writeln!(
                    out,
                    "    {} {} `{}`{}",
                    field.name, field.type_name, field.wire_key, marker
                )?;
            }
        }
        for (name, sig) in schema.symbols(pkg) {
            writeln!(out, "  {}", sig.render(None, name))?;
        }
        for (recv, name, sig) in schema.methods(pkg) {
            writeln!(out, "  {}", sig.render(Some(recv), name))?;
        }
        for (name, generic) in schema.generics(pkg) {
            for (type_args, symbol) in &generic.instances {
                writeln!(out, "  generic {}[{}] -> {}", name, type_args.join(", "), symbol)?;
            }
        }
        for (name, var) in schema.vars(pkg) {
            writeln!(out, "  var {} {}", name, var.type_name)?;
        }
    }
    Ok(())
}

/// Help text.
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [OPTIONS] <COMMAND>

Commands:
  inspect <MANIFEST>                      Print packages and declared symbols
  verify <MANIFEST>                       Check platform and library hash
  call <MANIFEST> <FUNCTION> [JSON...]    Call a function of the root package

Options:
  --log-level <LEVEL>      error, warn (default), info, debug, trace
  --log-format <FORMAT>    text (default) or json
  -h, --help               Show this help message

Examples:
  {program} inspect artifacts/mathx
  {program} call artifacts/mathx Add 2 40
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_inspect_with_flags() {
        let parsed = parse_args(&args("--log-level debug inspect m.json --log-format json")).unwrap();
        assert_eq!(
            parsed.command,
            Command::Inspect {
                manifest: "m.json".into()
            }
        );
        assert_eq!(parsed.log.level, Some(LogLevel::Debug));
        assert_eq!(parsed.log.format, Some(LogFormat::Json));
    }

    #[test]
    fn test_parse_call_arguments_as_json() {
        let parsed = parse_args(&[
            "call".to_string(),
            "dir".to_string(),
            "Greet".to_string(),
            "\"Ada\"".to_string(),
            "3".to_string(),
            "{\"Name\":\"x\"}".to_string(),
        ])
        .unwrap();
        let Command::Call { function, args, .. } = parsed.command else {
            panic!("expected a call");
        };
        assert_eq!(function, "Greet");
        assert_eq!(args[0], rmpv::Value::from("Ada"));
        assert_eq!(args[1], rmpv::Value::from(3));
        assert!(matches!(args[2], rmpv::Value::Map(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_args(&[]), Err(CliError::MissingArgument(_))));
        assert!(matches!(
            parse_args(&args("launch x")),
            Err(CliError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse_args(&args("inspect")),
            Err(CliError::MissingArgument(_))
        ));
        assert!(matches!(
            parse_args(&args("inspect a b")),
            Err(CliError::UnknownOption(_))
        ));
        assert!(matches!(
            parse_args(&args("--log-level loud verify a")),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_args(&args("call a F not-json")),
            Err(CliError::InvalidJson { index: 0, .. })
        ));
        assert!(matches!(
            parse_args(&args("--log-format")),
            Err(CliError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_render_tuple_outcome() {
        let outcome = Outcome::Tuple(vec![
            Outcome::Value(rmpv::Value::from(3)),
            Outcome::Value(rmpv::Value::from("x")),
        ]);
        assert_eq!(render_outcome(&outcome), serde_json::json!([3, "x"]));
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(&args("inspect -h")).unwrap().command, Command::Help);
        assert!(usage("dynbridge").contains("call <MANIFEST>"));
    }
}
