pub mod atomic_write;
pub mod canonical;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod process_lock;
pub mod spec_id;

pub use error::SmartSpecError;
pub use exit_codes::ExitCode;
pub use spec_id::SpecId;
