//! Per-session request routing and domains.
//!
//! A session starts with a single handler. Once converted to a domain it can
//! host several objects: the original handler becomes object 1 and every
//! interface pushed afterwards takes the next free slot. Closing an object
//! nulls its slot, so the remaining ids never move.

use std::sync::Arc;

use mizu_result::{ERR_REMOTE_PROCESS_DEAD, Result};
use mizu_servctl::ProcessId;
use mizu_sf::cmif::ObjectId;

use crate::context::RequestContext;

/// A type-erased request handler.
///
/// Every [`ServiceFramework`](crate::ServiceFramework) is one through a
/// blanket implementation.
pub trait SessionHandler: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Handles one request on this object.
    fn handle_sync_request(&self, ctx: &mut RequestContext<'_>) -> Result<()>;

    /// Called when a session starts using this handler.
    fn setup_session(&self, _pid: ProcessId) {}

    /// Called when a session stops using this handler.
    fn cleanup_session(&self, _pid: ProcessId) {}
}

/// Routing state of one session (shared by all of its cloned handles).
pub struct SessionRequestManager {
    requester_pid: ProcessId,
    is_domain: bool,
    session_handler: Option<Arc<dyn SessionHandler>>,
    domain_handlers: Vec<Option<Arc<dyn SessionHandler>>>,
}

impl SessionRequestManager {
    /// Creates a manager with no handler for a session opened by `pid`.
    pub fn new(requester_pid: ProcessId) -> Self {
        Self {
            requester_pid,
            is_domain: false,
            session_handler: None,
            domain_handlers: Vec::new(),
        }
    }

    /// Creates a manager and installs `handler`.
    pub fn with_handler(requester_pid: ProcessId, handler: Arc<dyn SessionHandler>) -> Self {
        let mut manager = Self::new(requester_pid);
        manager.set_session_handler(handler);
        manager
    }

    #[inline]
    pub fn requester_pid(&self) -> ProcessId {
        self.requester_pid
    }

    #[inline]
    pub fn is_domain(&self) -> bool {
        self.is_domain
    }

    #[inline]
    pub fn session_handler(&self) -> Option<&Arc<dyn SessionHandler>> {
        self.session_handler.as_ref()
    }

    /// Replaces the root handler, running the old handler's cleanup first.
    ///
    /// In a domain, object 1 follows the root handler while it still holds
    /// it.
    pub fn set_session_handler(&mut self, handler: Arc<dyn SessionHandler>) {
        if let Some(old) = self.session_handler.take() {
            old.cleanup_session(self.requester_pid);
            if let Some(slot) = self.root_slot_of(&old) {
                *slot = Some(handler.clone());
            }
        }
        handler.setup_session(self.requester_pid);
        self.session_handler = Some(handler);
    }

    /// Object 1, if it still holds `root`.
    fn root_slot_of(
        &mut self,
        root: &Arc<dyn SessionHandler>,
    ) -> Option<&mut Option<Arc<dyn SessionHandler>>> {
        self.domain_handlers
            .first_mut()
            .filter(|slot| matches!(slot, Some(handler) if Arc::ptr_eq(handler, root)))
    }

    /// Turns the session into a domain whose object 1 is the root handler.
    pub fn convert_to_domain(&mut self) {
        if self.is_domain {
            log::warn!(target: "IPC", "session is already a domain");
            return;
        }
        self.is_domain = true;
        self.domain_handlers.clear();
        self.domain_handlers.push(self.session_handler.clone());
    }

    /// Adds an object to the domain and returns its id.
    pub fn append_domain_handler(&mut self, handler: Arc<dyn SessionHandler>) -> ObjectId {
        handler.setup_session(self.requester_pid);
        self.domain_handlers.push(Some(handler));
        ObjectId::from_index(self.domain_handlers.len() - 1)
    }

    /// Returns the live object named by `id`.
    pub fn domain_handler(&self, id: ObjectId) -> Option<&Arc<dyn SessionHandler>> {
        self.domain_handlers.get(id.index())?.as_ref()
    }

    /// Number of slots, closed ones included.
    #[inline]
    pub fn domain_handler_count(&self) -> usize {
        self.domain_handlers.len()
    }

    /// Closes the object named by `id`. Its slot is never reused.
    pub fn close_domain_handler(&mut self, id: ObjectId) -> Result<()> {
        let slot = self
            .domain_handlers
            .get_mut(id.index())
            .ok_or(ERR_REMOTE_PROCESS_DEAD)?;
        let handler = slot.take().ok_or(ERR_REMOTE_PROCESS_DEAD)?;
        // Object 1 is the root handler. Teardown must not clean it up again.
        if id.index() == 0
            && self
                .session_handler
                .as_ref()
                .is_some_and(|root| Arc::ptr_eq(root, &handler))
        {
            self.session_handler = None;
        }
        handler.cleanup_session(self.requester_pid);
        log::debug!(target: "IPC", "closed domain object {id} ({})", handler.name());
        Ok(())
    }

    /// Returns the handler a request should be dispatched to.
    ///
    /// Domain requests are routed by object id; object id 0 and ids past
    /// the table never resolve.
    pub fn handler_for(&self, object_id: Option<u32>) -> Option<Arc<dyn SessionHandler>> {
        match (self.is_domain, object_id) {
            (true, Some(raw)) => self.domain_handler(ObjectId::new(raw)?).cloned(),
            _ => self.session_handler.clone(),
        }
    }

    /// Returns `true` if the request in `ctx` has somewhere to go.
    pub fn has_session_request_handler(&self, ctx: &RequestContext<'_>) -> bool {
        self.handler_for(ctx.object_id()).is_some()
    }

    /// Runs `cleanup_session` on every live handler.
    pub fn teardown(mut self) {
        let pid = self.requester_pid;
        let root = self.session_handler.take();
        for handler in self.domain_handlers.drain(..).flatten() {
            // Object 1 is the root handler itself.
            if root.as_ref().is_some_and(|root| Arc::ptr_eq(root, &handler)) {
                continue;
            }
            handler.cleanup_session(pid);
        }
        if let Some(root) = root {
            root.cleanup_session(pid);
        }
    }
}

impl core::fmt::Debug for SessionRequestManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionRequestManager")
            .field("requester_pid", &self.requester_pid)
            .field("is_domain", &self.is_domain)
            .field(
                "session_handler",
                &self.session_handler.as_ref().map(|h| h.name().to_owned()),
            )
            .field("domain_handlers", &self.domain_handlers.len())
            .finish()
    }
}
