//! Per-guest GPU instances and the refcounted table that owns them.

use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use mizu_servctl::{ProcessId, ServctlError, event::Event};
use mizu_sync::Shared;

use crate::{
    proto::{DEVICE_PATHS, MAX_SYNCPOINTS},
    types::Fd,
};

/// GPU state of one guest process.
#[derive(Debug)]
pub struct Gpu {
    pid: ProcessId,
    syncpoints: Vec<u32>,
    devices: BTreeMap<Fd, &'static str>,
    next_fd: u32,
    events: HashMap<u32, Event>,
    frames_presented: u64,
}

impl Gpu {
    pub fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            syncpoints: vec![0; MAX_SYNCPOINTS],
            devices: BTreeMap::new(),
            next_fd: 1,
            events: HashMap::new(),
            frames_presented: 0,
        }
    }

    #[inline]
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Opens a device node. Returns `None` for unknown paths.
    pub fn open(&mut self, path: &str) -> Option<Fd> {
        let node = DEVICE_PATHS.iter().copied().find(|node| *node == path)?;
        let fd = Fd::from_raw(self.next_fd);
        self.next_fd += 1;
        self.devices.insert(fd, node);
        Some(fd)
    }

    pub fn close(&mut self, fd: Fd) -> bool {
        self.devices.remove(&fd).is_some()
    }

    pub fn device(&self, fd: Fd) -> Option<&'static str> {
        self.devices.get(&fd).copied()
    }

    pub fn open_devices(&self) -> usize {
        self.devices.len()
    }

    /// Advances a syncpoint and returns its new value.
    pub fn increment_syncpoint(&mut self, id: u32) -> Option<u32> {
        let value = self.syncpoints.get_mut(id as usize)?;
        *value = value.wrapping_add(1);
        Some(*value)
    }

    pub fn syncpoint(&self, id: u32) -> Option<u32> {
        self.syncpoints.get(id as usize).copied()
    }

    /// Event for `event_id`, created on first use.
    pub fn event(&mut self, event_id: u32) -> Result<&Event, ServctlError> {
        match self.events.entry(event_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(Event::new()?)),
        }
    }

    /// Renderer placeholder: counts presented frames.
    pub fn present(&mut self) {
        self.frames_presented += 1;
    }

    #[inline]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

#[derive(Debug)]
struct GpuEntry {
    refcount: u32,
    gpu: Shared<Gpu>,
}

/// GPU instances keyed by guest pid. Every entry has a refcount of at least 1.
#[derive(Debug, Default)]
pub struct GpuTable {
    entries: HashMap<ProcessId, GpuEntry>,
}

impl GpuTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a reference on the GPU of `pid`, creating it when absent.
    pub fn grab(&mut self, pid: ProcessId) -> Shared<Gpu> {
        match self.entries.entry(pid) {
            Entry::Occupied(entry) => {
                let entry = entry.into_mut();
                entry.refcount += 1;
                log::trace!(target: "Service_NVDRV", "gpu {pid} refcount {}", entry.refcount);
                entry.gpu.clone()
            }
            Entry::Vacant(entry) => {
                log::debug!(target: "Service_NVDRV", "created gpu for {pid}");
                let gpu = Shared::new(Gpu::new(pid));
                entry.insert(GpuEntry {
                    refcount: 1,
                    gpu: gpu.clone(),
                });
                gpu
            }
        }
    }

    /// Drops a reference, destroying the GPU at zero.
    pub fn put(&mut self, pid: ProcessId) {
        let Entry::Occupied(mut entry) = self.entries.entry(pid) else {
            log::warn!(target: "Service_NVDRV", "put on unknown gpu {pid}");
            return;
        };
        entry.get_mut().refcount -= 1;
        if entry.get().refcount == 0 {
            entry.remove();
            log::debug!(target: "Service_NVDRV", "destroyed gpu for {pid}");
        }
    }

    pub fn gpu(&self, pid: ProcessId) -> Option<Shared<Gpu>> {
        self.entries.get(&pid).map(|entry| entry.gpu.clone())
    }

    /// Outstanding references on `pid`, zero when absent.
    pub fn refcount(&self, pid: ProcessId) -> u32 {
        self.entries.get(&pid).map_or(0, |entry| entry.refcount)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live pids.
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.entries.keys().copied()
    }
}
