//! Navigation-and-extraction engine for the facility reservation site.

pub mod context;
pub mod dates;
pub mod errors;
pub mod harvest;
pub mod holidays;
pub mod locator;
pub mod paginator;
pub mod retry;
pub mod search;
pub mod status;
pub mod table;

pub use errors::EngineError;
pub use harvest::{AttemptFailure, EngineConfig, Harvester};
pub use retry::{RetryController, RunOutcome};
