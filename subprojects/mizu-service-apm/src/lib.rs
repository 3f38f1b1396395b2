//! Application Performance Management (APM).
//!
//! ## Architecture
//!
//! All interfaces share one [`ApmController`] behind a `Shared` cell:
//! - **IManager** (`apm`, `apm:p`, `apm:am`): mode queries, opens sessions
//! - **ISession**: per-mode configuration
//! - **ISystemManager** (`apm:sys`): mode requests, CPU boost, performance event

mod controller;
mod manager;
mod proto;
mod system;

pub use self::{
    controller::ApmController,
    manager::{IManager, ISession},
    proto::{
        CpuBoostMode, PerformanceConfiguration, PerformanceMode, SERVICE_NAME, SERVICE_NAME_AM,
        SERVICE_NAME_PRIVILEGED, SERVICE_NAME_SYSTEM,
    },
    system::ISystemManager,
};
