//! Flow execution engine for Acolyte.
//!
//! A flow meta declares an ordered list of steps, each owned by a job.
//! Templates bind arguments to a meta; instances of a template are driven
//! forward by actors submitting actions against the active step.
//! [`FlowExecutor`] runs the state machine, [`FlowService`] exposes the
//! management and read operations.

pub mod binding;
pub mod context;
pub mod error;
pub mod executor;
pub mod field;
pub mod flow;
pub mod job;
pub mod lock;
pub mod memory;
pub mod model;
pub mod registry;
pub mod result;
pub mod service;
pub mod storage;
pub mod view;

pub use binding::{ArgSources, ArgumentError, TemplateBindError, pick, resolve_args};
pub use context::{ActionScope, FlowContext, Signal};
pub use error::{EngineError, RegistryError, Result};
pub use executor::{DEFAULT_LOCK_NAMESPACE, FlowExecutor};
pub use field::{FieldError, FieldKind, FieldReason, FieldRule};
pub use flow::{FINISH_STEP, FlowHooks, FlowMeta, NoopHooks, START_STEP};
pub use job::{ActionHandler, BindMark, JobArg, JobEvent, JobRef, JobSpec, TRIGGER};
pub use lock::{InProcessLock, LockGuard, NamedLock, with_lock};
pub use memory::MemoryStorage;
pub use model::{
    Actor, Arguments, BindArgs, FlowInstance, FlowStatus, FlowTemplate, InstanceFilter,
    JobActionData, JobInstance, JobStatus, NewFlowInstance, NewFlowTemplate,
};
pub use registry::{Definitions, Registry};
pub use result::{Rejection, ServiceResult, StatusCode};
pub use service::FlowService;
pub use storage::{ActorDirectory, FlowStorage};
