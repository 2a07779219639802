//! Environment preparation that must succeed before anything is timed.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{HarnessError, Result};

/// Run `program` with `args`; a non-zero exit is an error.
pub fn run_cmd(program: &str, args: &[&str], silent: bool) -> Result<()> {
    let shown = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    if !silent {
        println!("Command: {shown}");
    }

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| HarnessError::Setup(format!("{shown}: {e}")))?;
    if !status.success() {
        return Err(HarnessError::Setup(format!("{shown}: exited with {status}")));
    }
    Ok(())
}

/// Run each shell command line in order, stopping at the first failure.
pub fn setup_cmds<S: AsRef<str>>(cmds: &[S]) -> Result<()> {
    for cmd in cmds {
        run_cmd("sh", &["-c", cmd.as_ref()], true)?;
    }
    Ok(())
}

/// First executable file called `name` on `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fail unless the first `name` on `PATH` is `expected`, so anything shelling
/// out by name reaches the same executable.
pub fn ensure_first_in_path(name: &str, expected: &Path) -> Result<()> {
    let found = find_in_path(name);
    let same = match &found {
        Some(found) => canonical(found) == canonical(expected),
        None => false,
    };
    if same {
        return Ok(());
    }
    Err(HarnessError::EnvironmentMismatch {
        name: name.to_string(),
        expected: expected.display().to_string(),
        found: found
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".to_string()),
    })
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
