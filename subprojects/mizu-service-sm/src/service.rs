//! `sm:` server object.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use mizu_result::{ERR_SM_NOT_INITIALIZED, Result, ToResultCode};
use mizu_servctl::{ProcessId, SessionHandle, SessionId, ThreadId};
use mizu_service::{
    FunctionInfo, RequestContext, ServiceCore, ServiceFramework, ThreadDirectory, ThreadMessage,
};
use mizu_sf::ServiceName;
use mizu_sync::Shared;
use parking_lot::Mutex;

use crate::{
    proto::{SM_MAX_SESSIONS, SM_PORT_NAME},
    registry::ServiceManager,
};

/// `IUserInterface`, the handler behind `sm:`.
///
/// One instance serves every `sm:` session, so the initialized flag is kept
/// per requesting process. It is dropped with the process's last session.
pub struct IUserInterface {
    core: ServiceCore,
    manager: Shared<ServiceManager>,
    directory: Arc<ThreadDirectory>,
    clients: Mutex<Clients>,
}

#[derive(Default)]
struct Clients {
    sessions: HashMap<ProcessId, u32>,
    initialized: HashSet<ProcessId>,
}

impl IUserInterface {
    pub fn new(manager: Shared<ServiceManager>, directory: Arc<ThreadDirectory>) -> Self {
        Self {
            core: ServiceCore::with_max_sessions(SM_PORT_NAME, SM_MAX_SESSIONS),
            manager,
            directory,
            clients: Mutex::default(),
        }
    }

    #[inline]
    pub fn manager(&self) -> &Shared<ServiceManager> {
        &self.manager
    }

    pub fn is_initialized(&self, pid: ProcessId) -> bool {
        self.clients.lock().initialized.contains(&pid)
    }

    /// Number of open `sm:` sessions of `pid`.
    pub fn session_count(&self, pid: ProcessId) -> u32 {
        self.clients.lock().sessions.get(&pid).copied().unwrap_or(0)
    }

    pub(crate) fn mark_initialized(&self, pid: ProcessId) {
        log::debug!(target: "Service_SM", "client {pid} initialized");
        self.clients.lock().initialized.insert(pid);
    }

    /// Opens a session on `name` and returns the client handle.
    pub(crate) fn open_session(
        &self,
        ctx: &RequestContext<'_>,
        name: ServiceName,
    ) -> Result<SessionHandle> {
        let pid = ctx.pid();
        if !self.is_initialized(pid) {
            log::warn!(target: "Service_SM", "GetService({name}) before Initialize from {pid}");
            return Err(ERR_SM_NOT_INITIALIZED);
        }

        let record = self
            .manager
            .read()
            .get_service(name.as_str())
            .map_err(|err| {
                log::debug!(target: "Service_SM", "GetService({name}) failed: {err}");
                err.to_result_code()
            })?;

        let session = SessionId::fresh();
        let adopted = record.handler.is_some();
        if let Some(handler) = record.handler {
            // The owner installs the manager before it handles the first
            // request on the new handle.
            self.directory
                .post(
                    record.owner,
                    ThreadMessage::Adopt {
                        session,
                        pid,
                        handler,
                    },
                )
                .map_err(|err| {
                    log::error!(target: "Service_SM", "critical: cannot reach {name}: {err}");
                    err.to_result_code()
                })?;
        }

        let handle = match ctx.kernel().create_session_handle(record.owner, session) {
            Ok(handle) => handle,
            Err(err) => {
                log::error!(target: "Service_SM", "critical: session handle for {name} failed: {err}");
                if adopted
                    && let Err(post) = self
                        .directory
                        .post(record.owner, ThreadMessage::Discard { session })
                {
                    log::warn!(target: "Service_SM", "cannot discard session {session} of {name}: {post}");
                }
                return Err(err.to_result_code());
            }
        };
        log::debug!(target: "Service_SM", "GetService({name}) -> {handle} for {pid}");
        Ok(handle)
    }

    /// Registers a guest port and returns its server handle.
    pub(crate) fn register_port(
        &self,
        ctx: &RequestContext<'_>,
        name: ServiceName,
        max_sessions: i32,
    ) -> Result<SessionHandle> {
        let max_sessions = u32::try_from(max_sessions).unwrap_or(0);
        self.manager
            .write()
            .register_service(name.as_str(), max_sessions, None, ThreadId::ANONYMOUS)
            .map_err(|err| {
                log::debug!(target: "Service_SM", "RegisterService({name}) failed: {err}");
                err.to_result_code()
            })?;

        match ctx
            .kernel()
            .create_session_handle(ThreadId::ANONYMOUS, SessionId::fresh())
        {
            Ok(handle) => Ok(handle),
            Err(err) => {
                log::error!(target: "Service_SM", "critical: port handle for {name} failed: {err}");
                let _ = self.manager.write().unregister_service(name.as_str());
                Err(err.to_result_code())
            }
        }
    }

    pub(crate) fn unregister(&self, name: ServiceName) -> Result<()> {
        self.manager
            .write()
            .unregister_service(name.as_str())
            .map(|_| ())
            .map_err(|err| {
                log::debug!(target: "Service_SM", "UnregisterService({name}) failed: {err}");
                err.to_result_code()
            })
    }
}

impl ServiceFramework for IUserInterface {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::CMIF_HANDLERS
    }

    fn tipc_handlers() -> &'static [FunctionInfo<Self>] {
        Self::TIPC_HANDLERS
    }

    fn setup_session(&self, pid: ProcessId) {
        *self.clients.lock().sessions.entry(pid).or_default() += 1;
    }

    fn cleanup_session(&self, pid: ProcessId) {
        let mut clients = self.clients.lock();
        let Some(count) = clients.sessions.get_mut(&pid) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            clients.sessions.remove(&pid);
            if clients.initialized.remove(&pid) {
                log::debug!(target: "Service_SM", "client {pid} gone");
            }
        }
    }
}
