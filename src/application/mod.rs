pub mod bridge;
pub mod directory;
pub mod orchestrator;
pub mod prompt;
pub mod tooling;
pub mod transcript;
