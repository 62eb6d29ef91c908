pub mod agents;
pub mod failover;
pub mod model_registry;
pub mod providers;
pub mod service;
pub mod types;

// Re-export core types at crate root for convenience.
pub use agents::{AgentProfile, TaskKind, TaskProfile, agent, task};
pub use failover::{AttemptFailure, DispatchError, FailoverDispatcher};
pub use model_registry::{ModelSpec, model_spec, models_for_provider};
pub use providers::{ChatProvider, ProviderError};
pub use service::{PressroomService, TaskOutput};
pub use types::*;
