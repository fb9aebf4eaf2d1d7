pub mod daemon;
pub mod probe;
pub mod staging;
pub mod token;

pub use daemon::Daemon;
pub use probe::probe;
pub use staging::{stage, StageCollision, StageReport, StagedFile};
