mod execution_service;
mod runbook_service;
mod step_store;

pub use execution_service::ExecutionService;
pub use runbook_service::RunbookService;
pub use step_store::StepRecordStore;
