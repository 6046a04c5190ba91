//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod control;
pub mod error;
pub mod firmware;
pub mod install_plan;
pub mod unlock;

pub use config::{FleetConfig, Timings, validate_config};
pub use error::{ConfigError, ControlError, ProbeError, ProvisionError, TransportError};
pub use firmware::{FirmwareIdentity, parse_version_response};
pub use install_plan::{InstallStep, build_install_plan, generate_hwid};
