mod execution;
mod patch;
mod runbook;

pub use execution::{Execution, ExecutionStatus, ExecutionStep, ExecutionUpdate, NewExecution, Priority};
pub use patch::{BatchStepUpdate, StepPatch, StepUpdate};
pub use runbook::{NewRunbook, Runbook, RunbookUpdate, StepTemplate};
