mod orchestrator;
mod types;
mod view;


pub use orchestrator::{BoothComponents, Orchestrator};
pub use types::{BoothPhase, BoothRequest, OrchestratorSettings};
pub use view::BoothView;
