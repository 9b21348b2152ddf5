pub mod executor;

pub use executor::{
    CommandExecutor, CommandResult, ExecError, HaltReason, RunOptions, SequenceHalt,
    SequenceOutcome,
};
