//! Runtime glue for the service fabric.
//!
//! - [`config`]: TOML configuration with defaults
//! - [`logging`]: `env_logger` setup
//! - [`system`]: the state shared by every service thread
//! - [`bootstrap`]: one thread per well-known service, plus the vsync timer
//! - [`launcher`]: the POSIX message queue `hlaunch` writes to

pub mod bootstrap;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod system;

pub use self::{
    bootstrap::{BootstrapError, ServiceInstance, Services, spawn_service, start_services},
    config::{Backend, Config, ConfigError},
    launcher::{LauncherError, LauncherQueue},
    system::{ConfigSource, System},
};
