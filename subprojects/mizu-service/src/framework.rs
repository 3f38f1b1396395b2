//! Command tables and the service trait.
//!
//! A service is a plain struct implementing [`ServiceFramework`]. Its
//! commands live in sorted `'static` tables of [`FunctionInfo`]; an entry
//! without a handler is a known but unimplemented command.
//!
//! Handlers run under the service's instance lock. Entries built with
//! [`FunctionInfo::unserialized`] run without it and must take
//! [`ServiceFramework::lock_service`] themselves around the parts that need
//! it, releasing it before they block.
//!
//! ```text
//! impl ApmManager {
//!     const HANDLERS: &'static [FunctionInfo<Self>] = &[
//!         FunctionInfo::new(0, Some(Self::open_session), "OpenSession"),
//!         FunctionInfo::new(1, Some(Self::get_performance_mode), "GetPerformanceMode"),
//!         FunctionInfo::new(6, None, "IsCpuOverclockEnabled"),
//!     ];
//! }
//! ```

use mizu_result::{ERR_SF_NOT_IMPLEMENTED, Result};
use mizu_servctl::ProcessId;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::{context::RequestContext, session::SessionHandler};

/// Sessions a service accepts when it does not say otherwise.
pub const DEFAULT_MAX_SESSIONS: u32 = 64;

/// Command handler signature.
pub type HandlerFn<S> = fn(&S, &mut RequestContext<'_>) -> Result<()>;

/// One command table entry.
pub struct FunctionInfo<S> {
    pub id: u32,
    pub handler: Option<HandlerFn<S>>,
    pub name: &'static str,
    /// Whether dispatch takes the instance lock.
    pub serialized: bool,
}

impl<S> FunctionInfo<S> {
    pub const fn new(id: u32, handler: Option<HandlerFn<S>>, name: &'static str) -> Self {
        Self {
            id,
            handler,
            name,
            serialized: true,
        }
    }

    /// An entry dispatched without the instance lock.
    pub const fn unserialized(id: u32, handler: Option<HandlerFn<S>>, name: &'static str) -> Self {
        Self {
            id,
            handler,
            name,
            serialized: false,
        }
    }
}

impl<S> Clone for FunctionInfo<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for FunctionInfo<S> {}

impl<S> core::fmt::Debug for FunctionInfo<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("implemented", &self.handler.is_some())
            .field("serialized", &self.serialized)
            .finish()
    }
}

/// Looks up `id` in a table sorted by id.
pub fn find_function<S>(table: &[FunctionInfo<S>], id: u32) -> Option<&FunctionInfo<S>> {
    table
        .binary_search_by_key(&id, |info| info.id)
        .ok()
        .map(|index| &table[index])
}

/// State every service carries: its name, session limit and instance lock.
#[derive(Debug)]
pub struct ServiceCore {
    name: String,
    max_sessions: u32,
    lock: ReentrantMutex<()>,
}

impl ServiceCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_sessions(name, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_max_sessions(name: impl Into<String>, max_sessions: u32) -> Self {
        Self {
            name: name.into(),
            max_sessions,
            lock: ReentrantMutex::new(()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn max_sessions(&self) -> u32 {
        self.max_sessions
    }

    /// Takes the instance lock. Held for the duration of each serialized
    /// request.
    #[inline]
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }
}

/// A service implementation.
pub trait ServiceFramework: Send + Sync + Sized + 'static {
    fn core(&self) -> &ServiceCore;

    /// CMIF command table, sorted by id.
    fn handlers() -> &'static [FunctionInfo<Self>];

    /// TIPC command table, sorted by id.
    fn tipc_handlers() -> &'static [FunctionInfo<Self>] {
        &[]
    }

    fn setup_session(&self, _pid: ProcessId) {}

    fn cleanup_session(&self, _pid: ProcessId) {}

    /// Takes the instance lock, for work that runs outside a request.
    fn lock_service(&self) -> ReentrantMutexGuard<'_, ()> {
        self.core().lock()
    }
}

impl<S: ServiceFramework> SessionHandler for S {
    fn name(&self) -> &str {
        self.core().name()
    }

    fn handle_sync_request(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let table = if ctx.is_tipc() {
            S::tipc_handlers()
        } else {
            S::handlers()
        };

        let command = ctx.command();
        match find_function(table, command) {
            Some(FunctionInfo {
                handler: Some(handler),
                name,
                serialized,
                ..
            }) => {
                log::trace!(
                    target: "IPC",
                    "{}: dispatching {name} ({command})",
                    self.core().name()
                );
                let _guard = serialized.then(|| self.lock_service());
                handler(self, ctx)
            }
            Some(info) => {
                ctx.report_unimplemented(self.core().name(), Some(info.name));
                Err(ERR_SF_NOT_IMPLEMENTED)
            }
            None => {
                ctx.report_unimplemented(self.core().name(), None);
                Err(ERR_SF_NOT_IMPLEMENTED)
            }
        }
    }

    fn setup_session(&self, pid: ProcessId) {
        ServiceFramework::setup_session(self, pid);
    }

    fn cleanup_session(&self, pid: ProcessId) {
        ServiceFramework::cleanup_session(self, pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Dummy {
        fn zero(&self, _ctx: &mut RequestContext<'_>) -> Result<()> {
            Ok(())
        }

        const TABLE: &'static [FunctionInfo<Self>] = &[
            FunctionInfo::new(0, Some(Self::zero), "Zero"),
            FunctionInfo::new(3, None, "Three"),
            FunctionInfo::new(10, None, "Ten"),
        ];
    }

    #[test]
    fn test_find_function_binary_search() {
        assert_eq!(find_function(Dummy::TABLE, 3).unwrap().name, "Three");
        assert!(find_function(Dummy::TABLE, 0).unwrap().handler.is_some());
        assert!(find_function(Dummy::TABLE, 10).unwrap().handler.is_none());
        assert!(find_function(Dummy::TABLE, 4).is_none());
    }

    #[test]
    fn test_core_defaults() {
        let core = ServiceCore::new("apm");
        assert_eq!(core.name(), "apm");
        assert_eq!(core.max_sessions(), DEFAULT_MAX_SESSIONS);
        let _outer = core.lock();
        let _inner = core.lock();
    }
}
