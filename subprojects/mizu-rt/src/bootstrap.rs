//! Service thread startup and shutdown.
//!
//! Each well-known service runs on its own OS thread. A thread registers its
//! handler under the service name together with its own tid, so `sm:` can
//! route new sessions to it, then serves kernel events until terminated.

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use mizu_servctl::{ServctlError, ThreadId, timer::TimerId};
use mizu_service::{DEFAULT_MAX_SESSIONS, ServiceThread, SessionHandler, ThreadContext};
use mizu_service_apm::{ApmController, IManager, ISystemManager};
use mizu_service_ldn::IUserServiceCreator;
use mizu_service_ns::IApplicationManagerInterface;
use mizu_service_nv::INvDrvServices;
use mizu_service_sm::{IUserInterface, RegisterServiceError, SM_MAX_SESSIONS, SM_PORT_NAME};
use mizu_service_vi::{IHOSBinderDriver, IManagerRootService};
use mizu_sync::Shared;

use crate::system::System;

/// A running service thread.
pub struct ServiceInstance {
    name: &'static str,
    tid: ThreadId,
    thread: JoinHandle<Result<(), ServctlError>>,
}

impl ServiceInstance {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn tid(&self) -> ThreadId {
        self.tid
    }
}

/// Spawns the thread serving `name` and waits until it is registered.
pub fn spawn_service(
    system: &Arc<System>,
    name: &'static str,
    max_sessions: u32,
    handler: Arc<dyn SessionHandler>,
) -> Result<ServiceInstance, BootstrapError> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let worker = system.clone();
    let thread = std::thread::Builder::new()
        .name(format!("mizu:{name}"))
        .spawn(move || {
            let tid = ThreadId::current();
            // The mailbox exists before `sm:` can route a session here.
            let mailbox = worker.directory().register(tid);
            if let Err(err) = worker.service_manager().write().register_service(
                name,
                max_sessions,
                Some(handler),
                tid,
            ) {
                log::error!(target: "Service", "critical: cannot register {name}: {err}");
                worker.directory().unregister(tid);
                let _ = ready_tx.send(Err(err));
                return Ok(());
            }
            let _ = ready_tx.send(Ok(tid));
            log::debug!(target: "Service", "{name} serving on {tid:?}");

            let context = ThreadContext::new(worker.kernel().clone(), worker.reporter().clone(), tid);
            let result = ServiceThread::new(context, mailbox).run();

            worker.service_manager().write().unregister_owned_by(tid);
            worker.directory().unregister(tid);
            result
        })
        .map_err(BootstrapError::Spawn)?;

    match ready_rx.recv() {
        Ok(Ok(tid)) => Ok(ServiceInstance { name, tid, thread }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(BootstrapError::Register { name, source: err })
        }
        Err(_) => {
            let _ = thread.join();
            Err(BootstrapError::Exited(name))
        }
    }
}

/// The running service threads and the vsync timer.
pub struct Services {
    system: Arc<System>,
    instances: Vec<ServiceInstance>,
    vsync: Option<TimerId>,
}

impl Services {
    #[inline]
    pub fn system(&self) -> &Arc<System> {
        &self.system
    }

    /// Thread serving `name`.
    pub fn thread_of(&self, name: &str) -> Option<ThreadId> {
        self.instances
            .iter()
            .find(|instance| instance.name == name)
            .map(ServiceInstance::tid)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.instances.iter().map(ServiceInstance::name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Stops the vsync timer, terminates every thread and joins them.
    ///
    /// Every thread is joined even when one fails. The first failure is
    /// returned.
    pub fn shutdown(mut self) -> Result<(), BootstrapError> {
        if let Some(vsync) = self.vsync.take() {
            let timers = self.system.timers();
            if let Err(err) = timers.cancel(vsync).and_then(|()| timers.close(vsync)) {
                log::warn!(target: "Service", "vsync timer teardown failed: {err}");
            }
        }

        let kernel = self.system.kernel().clone();
        for instance in &self.instances {
            if let Err(err) = kernel.terminate(instance.tid) {
                log::error!(target: "Kernel", "critical: cannot terminate {}: {err}", instance.name);
            }
        }

        let mut first = None;
        for instance in self.instances.drain(..) {
            let outcome = match instance.thread.join() {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(BootstrapError::Servctl(err)),
                Err(_) => Err(BootstrapError::Panicked(instance.name)),
            };
            if let Err(err) = outcome {
                log::error!(target: "Service", "critical: {} stopped: {err}", instance.name);
                first.get_or_insert(err);
            } else {
                log::debug!(target: "Service", "{} stopped", instance.name);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Starts one thread per well-known service and the vsync timer.
pub fn start_services(system: &Arc<System>) -> Result<Services, BootstrapError> {
    let apm = Shared::new(ApmController::new()?);
    let gpus = system.gpus().clone();
    let nv_flinger = system.nv_flinger().clone();
    let language = system.config().read().language_code();

    let table: Vec<(&'static str, u32, Arc<dyn SessionHandler>)> = vec![
        (
            SM_PORT_NAME,
            SM_MAX_SESSIONS,
            Arc::new(IUserInterface::new(
                system.service_manager().clone(),
                system.directory().clone(),
            )),
        ),
        ("apm", DEFAULT_MAX_SESSIONS, Arc::new(IManager::new("apm", apm.clone()))),
        ("apm:p", DEFAULT_MAX_SESSIONS, Arc::new(IManager::new("apm:p", apm.clone()))),
        ("apm:am", DEFAULT_MAX_SESSIONS, Arc::new(IManager::new("apm:am", apm.clone()))),
        ("apm:sys", DEFAULT_MAX_SESSIONS, Arc::new(ISystemManager::new(apm))),
        (
            "ns:am2",
            DEFAULT_MAX_SESSIONS,
            Arc::new(IApplicationManagerInterface::new(language, system.language_source())),
        ),
        ("nvdrv", DEFAULT_MAX_SESSIONS, Arc::new(INvDrvServices::new("nvdrv", gpus.clone()))),
        ("nvdrv:a", DEFAULT_MAX_SESSIONS, Arc::new(INvDrvServices::new("nvdrv:a", gpus.clone()))),
        ("nvdrv:s", DEFAULT_MAX_SESSIONS, Arc::new(INvDrvServices::new("nvdrv:s", gpus))),
        ("vi:m", DEFAULT_MAX_SESSIONS, Arc::new(IManagerRootService::new(nv_flinger.clone()))),
        (
            "dispdrv",
            DEFAULT_MAX_SESSIONS,
            Arc::new(IHOSBinderDriver::new("dispdrv", nv_flinger)),
        ),
        ("ldn:u", DEFAULT_MAX_SESSIONS, Arc::new(IUserServiceCreator::new())),
    ];

    let mut services = Services {
        system: system.clone(),
        instances: Vec::with_capacity(table.len()),
        vsync: None,
    };
    for (name, max_sessions, handler) in table {
        match spawn_service(system, name, max_sessions, handler) {
            Ok(instance) => services.instances.push(instance),
            Err(err) => {
                let _ = services.shutdown();
                return Err(err);
            }
        }
    }

    match start_vsync(system) {
        Ok(vsync) => services.vsync = vsync,
        Err(err) => {
            let _ = services.shutdown();
            return Err(err.into());
        }
    }
    log::info!(target: "Service", "{} services running", services.len());
    Ok(services)
}

fn start_vsync(system: &System) -> Result<Option<TimerId>, ServctlError> {
    let hz = system.config().read().display.vsync_hz;
    if hz == 0 {
        log::warn!(target: "Service_VI", "vsync disabled");
        return Ok(None);
    }

    let payload = (system.nv_flinger().clone(), system.gpus().clone());
    let timers = system.timers();
    let vsync = timers.create("vsync", payload, |(nv_flinger, gpus)| {
        let presented = nv_flinger.read().compose(&gpus.read());
        log::trace!(target: "Service_VI", "vsync, {presented} frames presented");
    });
    timers.schedule_repeat(vsync, Duration::from_nanos(1_000_000_000 / u64::from(hz)))?;
    Ok(Some(vsync))
}

/// Error returned while starting or stopping services.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("cannot spawn service thread")]
    Spawn(#[source] std::io::Error),
    #[error("cannot register {name}")]
    Register {
        name: &'static str,
        #[source]
        source: RegisterServiceError,
    },
    #[error("{0} exited before it was ready")]
    Exited(&'static str),
    #[error("{0} panicked")]
    Panicked(&'static str),
    #[error(transparent)]
    Servctl(#[from] ServctlError),
}
