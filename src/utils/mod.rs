pub mod logging;
pub mod signals;

use std::path::PathBuf;
use std::process::Output;
use which::which;

/// Locates an external client tool (`pg_dump`, `mongorestore`, ...) on the `PATH`.
pub fn find_executable(name: &str) -> Result<PathBuf, String> {
    which(name).map_err(|_| {
        format!(
            "{} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.",
            name
        )
    })
}

/// Best available explanation of why a child process failed.
pub fn command_diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }
    format!("process exited with {}", output.status)
}
