#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::manual_range_contains,
    clippy::derivable_impls,
    clippy::type_complexity,
    clippy::len_zero,
    dead_code,
    unused_imports
)]

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod repo;
pub mod services;
pub mod uploads;

pub use client::{ApiClient, CoordinatorEvent, ExecutionApi, HealthStatus, StepUpdateCoordinator};
pub use config::{
    get_config_dir, ClientConfig, ConfigLoadError, DatabaseConfig, LoggingConfig, RunsheetConfig,
    ServerConfig, StorageBackend,
};
pub use db::{
    init_database, init_database_with_config, init_database_with_url, Database, DatabaseError,
};
pub use error::{RunsheetError, RunsheetResult};
pub use http::{router, serve, serve_with_listener, ApiError, AppState};
pub use models::{
    BatchStepUpdate, Execution, ExecutionStatus, ExecutionStep, ExecutionUpdate, NewExecution,
    NewRunbook, Priority, Runbook, RunbookUpdate, StepPatch, StepTemplate, StepUpdate,
};
pub use repo::{
    ExecutionRepository, MemoryExecutionRepository, MemoryRunbookRepository,
    PgExecutionRepository, PgRunbookRepository, Repository, RunbookRepository,
};
pub use services::{ExecutionService, RunbookService, StepRecordStore};
pub use uploads::{stored_file_name, UploadStore, UPLOADS_ROUTE};
