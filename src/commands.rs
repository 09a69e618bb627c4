//! The `fix` command surface.
//!
//! The surrounding debugger's command dispatcher hands us the tokenized
//! arguments; this module validates them, normalizes the paths the way the
//! dynamic linker will later report them, runs the request, and prints
//! either the human confirmation or the machine-readable report.

use crate::error::{FixError, FixResult};
use crate::inferior::Inferior;
use crate::report::FixOutcome;
use crate::session::{FixRequest, Session};
use std::fs;
use std::io::Write;
use std::path::Path;

const USAGE: &str = "Usage: fix bundle-filename source-filename [object-filename]";

/// How results are presented: a console confirmation, or the structured
/// `replaced-functions` record for machine-readable front ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Console,
    MachineReadable,
}

/// Validate the argument shape and normalize the paths: two required
/// arguments, an optional third, everything tilde-expanded, and the bundle
/// resolved to the same form dyld will report it in.
fn parse_args(args: &[&str]) -> FixResult<FixRequest> {
    if args.len() < 2 || args.len() > 3 || args.iter().any(|a| a.is_empty()) {
        return Err(FixError::Usage(USAGE.to_string()));
    }
    Ok(FixRequest {
        bundle_filename: realpath(&tilde_expand(args[0])),
        source_filename: tilde_expand(args[1]),
        object_filename: args.get(2).map(|a| tilde_expand(a)),
    })
}

/// Run `fix <bundle> <source> [<object>]`.
pub fn fix_command(
    session: &mut Session,
    inferior: &mut dyn Inferior,
    args: &[&str],
    output: OutputKind,
    out: &mut dyn Write,
) -> FixResult<()> {
    let request = parse_args(args)?;

    if !file_exists(&request.source_filename) {
        return Err(FixError::NotFound(format!(
            "Source file '{}' not found.",
            request.source_filename
        )));
    }
    if !file_exists(&request.bundle_filename) {
        return Err(FixError::NotFound(format!(
            "Bundle '{}' not found.",
            request.bundle_filename
        )));
    }
    if let Some(object) = &request.object_filename {
        if !file_exists(object) {
            return Err(FixError::NotFound(format!("Object '{object}' not found.")));
        }
    }

    let outcome = session.fix(inferior, &request)?;

    print_outcome(&outcome, output, out)
}

fn print_outcome(
    outcome: &FixOutcome,
    output: OutputKind,
    out: &mut dyn Write,
) -> FixResult<()> {
    let io_err = |err: std::io::Error| FixError::Io(err.to_string());
    match output {
        OutputKind::Console => writeln!(out, "Fix succeeded.").map_err(io_err),
        OutputKind::MachineReadable => {
            let json = serde_json::to_string(outcome)
                .map_err(|err| FixError::Internal(err.to_string()))?;
            writeln!(out, "{json}").map_err(io_err)
        }
    }
}

/// Expand a leading `~/` (or bare `~`) to the user's home directory.
fn tilde_expand(path: &str) -> String {
    if path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

/// Resolve symlinks and relative components; fall back to the input when the
/// path doesn't resolve (the existence check will produce the diagnostic).
fn realpath(path: &str) -> String {
    fs::canonicalize(Path::new(path))
        .ok()
        .and_then(|p| p.into_os_string().into_string().ok())
        .unwrap_or_else(|| path.to_string())
}

/// Does `path` name a regular file or a symlink?
fn file_exists(path: &str) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_file() || meta.file_type().is_symlink(),
        Err(_) => false,
    }
}
