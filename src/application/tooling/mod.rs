mod error;
mod interface;
mod process;

pub use error::HostError;
pub use interface::{ContentBlock, NullHost, ToolHostInterface, ToolPayload};
pub use process::HostProcess;
