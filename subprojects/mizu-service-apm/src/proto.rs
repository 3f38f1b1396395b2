//! Names, command ids and wire types of the performance manager.

use mizu_service::wire_enum;

/// Service name of the application-facing manager.
pub const SERVICE_NAME: &str = "apm";

/// Privileged manager.
pub const SERVICE_NAME_PRIVILEGED: &str = "apm:p";

/// Applet manager variant.
pub const SERVICE_NAME_AM: &str = "apm:am";

/// System manager.
pub const SERVICE_NAME_SYSTEM: &str = "apm:sys";

pub const CMD_OPEN_SESSION: u32 = 0;

pub const CMD_GET_PERFORMANCE_MODE: u32 = 1;

/// IManager command: IsCpuOverclockEnabled.
pub const CMD_IS_CPU_OVERCLOCK_ENABLED: u32 = 6;

pub const CMD_SET_PERFORMANCE_CONFIGURATION: u32 = 0;

pub const CMD_GET_PERFORMANCE_CONFIGURATION: u32 = 1;

/// ISession command: SetCpuOverclockEnabled.
pub const CMD_SET_CPU_OVERCLOCK_ENABLED: u32 = 2;

/// ISystemManager command: RequestPerformanceMode.
pub const CMD_REQUEST_PERFORMANCE_MODE: u32 = 0;

/// ISystemManager command: GetPerformanceEvent.
pub const CMD_GET_PERFORMANCE_EVENT: u32 = 1;

/// ISystemManager command: SetCpuBoostMode.
pub const CMD_SET_CPU_BOOST_MODE: u32 = 6;

/// ISystemManager command: GetCurrentPerformanceConfiguration.
pub const CMD_GET_CURRENT_PERFORMANCE_CONFIGURATION: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PerformanceMode {
    Invalid = -1,
    Normal = 0,
    Boost = 1,
}

impl PerformanceMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::Invalid),
            0 => Some(Self::Normal),
            1 => Some(Self::Boost),
            _ => None,
        }
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// A clock configuration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PerformanceConfiguration(pub u32);

impl PerformanceConfiguration {
    /// Normal mode default.
    pub const CONFIG_7: Self = Self(0x0002_0003);
    /// Boost mode default, also used for partial CPU boost.
    pub const CONFIG_13: Self = Self(0x9222_0009);
    /// Fast-load CPU boost.
    pub const CONFIG_15: Self = Self(0x9222_000B);

    /// Configuration a mode starts with.
    pub const fn default_for(mode: PerformanceMode) -> Self {
        match mode {
            PerformanceMode::Boost => Self::CONFIG_13,
            _ => Self::CONFIG_7,
        }
    }
}

wire_enum! {
    /// CPU boost requested by the system.
    pub enum CpuBoostMode {
        Normal = 0,
        FastLoad = 1,
        Partial = 2,
    }
}

impl CpuBoostMode {
    /// Configuration the normal mode switches to.
    pub const fn configuration(self) -> PerformanceConfiguration {
        match self {
            Self::Normal => PerformanceConfiguration::CONFIG_7,
            Self::FastLoad => PerformanceConfiguration::CONFIG_15,
            Self::Partial => PerformanceConfiguration::CONFIG_13,
        }
    }
}
