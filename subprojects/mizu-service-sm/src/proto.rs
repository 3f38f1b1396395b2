//! Port name, command ids and request layouts of `sm:`.

use mizu_sf::ServiceName;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// SM named port.
pub const SM_PORT_NAME: &str = "sm:";

pub const REGISTER_CLIENT: u32 = 0;

pub const GET_SERVICE_HANDLE: u32 = 1;

pub const REGISTER_SERVICE: u32 = 2;

pub const UNREGISTER_SERVICE: u32 = 3;

pub const DETACH_CLIENT: u32 = 4;

/// Session limit of `sm:` itself.
pub const SM_MAX_SESSIONS: u32 = 0x40;

/// Input of [`REGISTER_SERVICE`].
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RegisterServiceIn {
    pub name: u64,
    pub is_light: u8,
    pub _pad: [u8; 3],
    pub max_sessions: i32,
}

impl RegisterServiceIn {
    pub fn new(name: ServiceName, is_light: bool, max_sessions: i32) -> Self {
        Self {
            name: name.to_u64(),
            is_light: u8::from(is_light),
            _pad: [0; 3],
            max_sessions,
        }
    }
}
