/// Process execution for the engine
///
/// Plugins, notification commands and event handlers all run through the
/// same bounded pool of workers.
pub mod executor;

pub use executor::ProcessExecutor;
