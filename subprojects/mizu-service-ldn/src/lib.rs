//! Local wireless communication (`ldn:u`).
//!
//! Local play is disabled: the session reports [`State::Error`] and
//! `Initialize` fails with [`ERR_LDN_DISABLED`](mizu_result::ERR_LDN_DISABLED).

mod proto;
mod service;

pub use self::{
    proto::{SERVICE_NAME_USER, State, user_cmds},
    service::{IUserLocalCommunicationService, IUserServiceCreator},
};
