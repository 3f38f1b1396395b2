//! Service Manager (`sm:`).
//!
//! The [`ServiceManager`] registry maps service names to the thread and
//! handler that serve them. [`IUserInterface`] exposes it to guests over
//! both protocols:
//!
//! - **CMIF**: `Initialize`, `GetService`, `RegisterService`,
//!   `UnregisterService`.
//! - **TIPC**: the same ids; `GetServiceHandle` always returns a handle
//!   word, zero on failure.
//!
//! `GetService` on a locally served name posts the new session to the
//! owner thread's mailbox before the handle is returned, so the owner never
//! sees a request on a session it does not know.

mod cmif;
mod proto;
mod registry;
mod service;
mod tipc;

pub use self::{
    proto::{
        DETACH_CLIENT, GET_SERVICE_HANDLE, REGISTER_CLIENT, REGISTER_SERVICE, RegisterServiceIn,
        SM_MAX_SESSIONS, SM_PORT_NAME, UNREGISTER_SERVICE,
    },
    registry::{
        GetServiceError, RegisterServiceError, ServiceManager, ServiceRecord,
        UnregisterServiceError,
    },
    service::IUserInterface,
};
