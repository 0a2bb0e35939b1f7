pub mod driver;
pub mod error;
pub mod healing;
pub mod parser;
pub mod pool;
pub mod report;
pub mod runner;
pub mod utils;
pub mod workflow;

// Re-export common items
pub use error::{ControlError, FieldError, PoolError, ResolveError, RunError, StepError};
pub use pool::BrowserPool;
pub use runner::{build_control_plane, run_steps, ControlAction, ControlPlane};
pub use workflow::{WorkflowRegistry, WorkflowResolver};
