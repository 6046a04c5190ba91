//! Command implementations

pub mod hwid;
pub mod probe;
pub mod run;
