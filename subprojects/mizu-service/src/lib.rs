//! # mizu-service
//!
//! The server half of the HOS IPC runtime: what happens between a request
//! arriving on a service thread and its reply going back to the kernel.
//!
//! - [`ServiceThread`] owns the sessions of one OS thread and runs the
//!   receive/dispatch/reply loop.
//! - [`SessionRequestManager`] routes a session's requests to its handler,
//!   or to one of its domain objects.
//! - [`ServiceFramework`] turns a plain struct with a sorted command table
//!   into a [`SessionHandler`].
//! - [`RequestContext`] pops parameters, moves guest buffers and builds the
//!   response through a [`ResponseBuilder`].
//! - [`Controller`] answers the IPC control sub-protocol (domain conversion,
//!   session clones, pointer buffer size).
//!
//! Calls to commands without a handler are answered with
//! [`ERR_SF_NOT_IMPLEMENTED`](mizu_result::ERR_SF_NOT_IMPLEMENTED) and
//! recorded in the shared [`Reporter`].

pub mod async_context;
mod context;
mod controller;
mod framework;
pub mod reporter;
mod session;
pub mod thread;
mod wire;

pub use self::{
    async_context::{AsyncContext, IAsyncContext},
    context::{
        FinishedRequest, RequestContext, ResponseBuilder, ResponseFlags, StagedSession,
        ThreadContext,
    },
    controller::{Controller, POINTER_BUFFER_SIZE},
    framework::{
        DEFAULT_MAX_SESSIONS, FunctionInfo, HandlerFn, ServiceCore, ServiceFramework, find_function,
    },
    reporter::{Reporter, UnimplementedReport},
    session::{SessionHandler, SessionRequestManager},
    thread::{MailboxError, ServiceThread, ThreadDirectory, ThreadMessage},
    wire::WireEnum,
};
