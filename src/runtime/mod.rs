mod assess;
mod orchestrator;
mod run;
mod shutdown;
mod startup;
mod state;
mod types;


pub use assess::{assess, storage_chain};
pub use orchestrator::{AdaptiveRuntime, AdaptiveRuntimeBuilder, DetectionCollaborators};
pub use types::{Assessment, ComponentState, ShutdownReason};
