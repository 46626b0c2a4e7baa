use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::LauncherConfig;
use crate::error::{LaunchError, Result};

/// The script a driver resubmits and the interpreter its shebang must name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub script: PathBuf,
    pub interpreter: PathBuf,
}

impl LaunchTarget {
    pub fn new(script: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            interpreter: interpreter.into(),
        }
    }

    /// Target for the running process: the script is `argv[0]` made absolute,
    /// the interpreter is the configured override or the running executable.
    pub fn current(config: &LauncherConfig) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|source| LaunchError::ScriptPath {
            path: PathBuf::from("<current executable>"),
            source,
        })?;
        let script = match std::env::args_os().next().map(PathBuf::from) {
            // Bare names were found through PATH; the executable is the script.
            Some(arg0) if arg0.components().count() > 1 => resolve_script(&arg0)?,
            _ => exe.clone(),
        };
        let interpreter = config.interpreter.clone().unwrap_or(exe);
        Ok(Self {
            script,
            interpreter,
        })
    }

    /// A compiled program resubmits its own executable, which is its own
    /// interpreter and carries no shebang. Any other script must name the
    /// interpreter on its first line.
    pub fn validate(&self) -> Result<()> {
        if self.is_running_executable() {
            debug!(script = %self.script.display(), "script is the running executable");
            return Ok(());
        }
        ensure_shebang(&self.script, &self.interpreter)
    }

    pub fn is_running_executable(&self) -> bool {
        let Ok(exe) = std::env::current_exe().and_then(fs::canonicalize) else {
            return false;
        };
        fs::canonicalize(&self.script)
            .map(|script| script == exe)
            .unwrap_or(false)
    }
}

pub fn resolve_script(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| LaunchError::ScriptPath {
        path: path.to_path_buf(),
        source,
    })
}

/// Fails unless the first line of `script` contains `interpreter`.
pub fn ensure_shebang(script: &Path, interpreter: &Path) -> Result<()> {
    let line = first_line(script)?;
    let wanted = interpreter.to_string_lossy();
    if wanted.is_empty() || !line.contains(wanted.as_ref()) {
        return Err(LaunchError::ShebangMismatch {
            script: script.to_path_buf(),
            interpreter: interpreter.to_path_buf(),
        });
    }
    Ok(())
}

fn first_line(script: &Path) -> Result<String> {
    let unreadable = |source| LaunchError::ScriptUnreadable {
        path: script.to_path_buf(),
        source,
    };
    let file = fs::File::open(script).map_err(unreadable)?;
    let mut buf = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut buf)
        .map_err(unreadable)?;
    Ok(String::from_utf8_lossy(&buf).trim_end().to_string())
}
