pub mod executions;
pub mod runbooks;
pub mod upload;

pub use executions::{handle_exec_command, ExecCommand};
pub use runbooks::{handle_runbooks_command, RunbooksCommand};
pub use upload::handle_upload_command;

use anyhow::{anyhow, bail};
use uuid::Uuid;

/// First eight characters of an id, as shown in tables.
pub fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Accepts a full id or a prefix that matches exactly one of `candidates`.
pub fn resolve_id(input: &str, candidates: &[Uuid], kind: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let prefix = input.to_lowercase();
    let matches: Vec<&Uuid> = candidates
        .iter()
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [id] => Ok(**id),
        [] => Err(anyhow!("No {} matches '{}'", kind, input)),
        _ => bail!(
            "'{}' matches {} {}s, use more characters",
            input,
            matches.len(),
            kind
        ),
    }
}

/// Converts a 1-based step number from the command line to an index.
pub fn step_index(step: usize) -> anyhow::Result<usize> {
    step.checked_sub(1)
        .ok_or_else(|| anyhow!("Step numbers start at 1"))
}
