mod controller;
mod state;
mod traits;
pub mod types;

pub use controller::GenerationController;
pub use state::{KillSwitch, RunPhase, RunState, StateTransition};
pub use traits::{ModelProvider, ModelSession, TokenStream};
pub use types::{ControllerOptions, RunOutcome};
