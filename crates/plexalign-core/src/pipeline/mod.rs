pub mod config;
pub mod memory;
mod orchestrator;
mod pair;
mod types;

pub use config::{AnchorPolicy, RegistrationConfig};
pub use memory::MemoryBudget;
pub use orchestrator::{register_set, register_set_reported};
pub use pair::{register_pair, PairRegistration};
pub use types::{
    FrameFailure, ProgressReporter, RegistrationOutcome, RegistrationStage, RoundRegistration,
    RoundState,
};
