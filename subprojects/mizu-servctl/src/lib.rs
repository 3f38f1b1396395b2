//! # mizu-servctl
//!
//! Typed access to the host kernel module's `servctl` primitives.
//!
//! The host module implements the Horizon OS kernel objects that user-space
//! services need: session handles routed to a server thread, copy handles
//! wrapping host file descriptors, cross-process buffer transfer and process
//! id queries. This crate hides the raw syscall ABI behind the [`Kernel`]
//! trait and converts every `-1/errno` return into a [`ServctlError`] that
//! maps onto a kernel-module [`ResultCode`](mizu_result::ResultCode).
//!
//! Two backends implement [`Kernel`]:
//!
//! - [`HostKernel`]: issues the real syscall through `libc`.
//! - [`LoopbackKernel`]: an in-process kernel with the same routing semantics,
//!   used to run services without the host module (tests, bring-up).
//!
//! The crate also carries the host-side event, timer and shared-memory
//! objects whose file descriptors travel on the wire as copy handles.

pub mod clock;
mod error;
pub mod event;
mod handle;
mod host;
mod kernel;
pub mod loopback;
pub mod raw;
pub mod shmem;
pub mod timer;

pub use self::{
    error::ServctlError,
    handle::{CopyHandle, ProcessId, SessionHandle, SessionId, ThreadId, VAddr},
    host::HostKernel,
    kernel::{COMMAND_BUFFER_WORDS, Kernel, KernelEvent, RawCommandBuffer},
    loopback::LoopbackKernel,
};
