//! Tasks: the persisted data model, the lifecycle state machine and the
//! rejection-feedback memory.

pub mod lifecycle;
pub mod types;
pub mod wisdom;

pub use lifecycle::{retry_prompt, LifecycleRules, Spawned, TaskLifecycle};
pub use types::{
    new_task_id, ApiEndpoint, ApprovalReason, Architecture, DataModel, FileCritique, FileSpec,
    GeneratedFile, IntegrationIssue, IntegrationReport, NewTask, Settings, SettingsPatch,
    StreamEntry, Task, TaskSource, TaskStatus, TechStack, GENERATION_FAILED_PREFIX,
};
pub use wisdom::WisdomMemory;
