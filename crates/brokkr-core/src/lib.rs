//! # brokkr-core
//!
//! Core library for the Brokkr secret broker providing:
//! - Configuration loading (`brokkr.yaml` plus environment overrides)
//! - A process runner seam for the external vault CLI
//! - A cached liveness check shared by the session and the probes

pub mod config;
pub mod error;
pub mod liveness;
pub mod probes;
pub mod process;
pub mod utils;

pub use config::{BrokerConfig, CredentialEnv};
pub use error::{Error, Result};
pub use liveness::CachedLivenessCheck;
pub use process::{CommandOutput, CommandRunner, SystemRunner};
pub use utils::get_home_dir;
