//! Displays, layers and the compositor loop.

use std::{collections::BTreeMap, sync::Arc};

use mizu_servctl::{ProcessId, ServctlError, event::Event};
use mizu_service_nv::GpuTable;

use crate::{
    buffer_queue::BufferQueue,
    proto::{DISPLAY_HEIGHT, DISPLAY_WIDTH},
    types::{BinderObjectId, DisplayId, LayerId, ScalingMode},
};

/// Names of the displays every system exposes, in id order.
pub const DISPLAY_NAMES: [&str; 5] = ["Default", "External", "Edid", "Internal", "Null"];

#[derive(Debug)]
pub struct Display {
    id: DisplayId,
    name: &'static str,
    vsync_event: Event,
    open_count: u32,
}

impl Display {
    #[inline]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn vsync_event(&self) -> &Event {
        &self.vsync_event
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open_count > 0
    }
}

#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    display: DisplayId,
    owner: ProcessId,
    scaling_mode: ScalingMode,
    queue: Arc<BufferQueue>,
}

impl Layer {
    #[inline]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[inline]
    pub fn display(&self) -> DisplayId {
        self.display
    }

    #[inline]
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    #[inline]
    pub fn scaling_mode(&self) -> ScalingMode {
        self.scaling_mode
    }

    #[inline]
    pub fn buffer_queue(&self) -> &Arc<BufferQueue> {
        &self.queue
    }
}

/// The compositor. Owns every display and layer of the system.
#[derive(Debug)]
pub struct NvFlinger {
    displays: Vec<Display>,
    layers: BTreeMap<LayerId, Layer>,
    next_layer_id: u64,
    next_binder_id: i32,
}

impl NvFlinger {
    pub fn new() -> Result<Self, ServctlError> {
        let displays: Vec<Display> = DISPLAY_NAMES
            .iter()
            .enumerate()
            .map(|(id, &name)| {
                Ok(Display {
                    id: DisplayId::new(id as u64),
                    name,
                    vsync_event: Event::new()?,
                    open_count: 0,
                })
            })
            .collect::<Result<_, ServctlError>>()?;
        Ok(Self {
            displays,
            layers: BTreeMap::new(),
            next_layer_id: 1,
            next_binder_id: 1,
        })
    }

    pub fn display(&self, id: DisplayId) -> Option<&Display> {
        self.displays.iter().find(|display| display.id == id)
    }

    fn display_mut(&mut self, id: DisplayId) -> Option<&mut Display> {
        self.displays.iter_mut().find(|display| display.id == id)
    }

    /// Opens the display called `name`.
    pub fn open_display(&mut self, name: &str) -> Option<DisplayId> {
        let display = self.displays.iter_mut().find(|display| display.name == name)?;
        display.open_count += 1;
        log::debug!(target: "Service_VI", "opened display {name} ({})", display.id);
        Some(display.id)
    }

    /// Returns `false` when `id` does not name an open display.
    pub fn close_display(&mut self, id: DisplayId) -> bool {
        match self.display_mut(id) {
            Some(display) if display.open_count > 0 => {
                display.open_count -= 1;
                log::debug!(target: "Service_VI", "closed display {id}");
                true
            }
            _ => false,
        }
    }

    pub fn display_resolution(&self, id: DisplayId) -> Option<(u32, u32)> {
        self.display(id).map(|_| (DISPLAY_WIDTH, DISPLAY_HEIGHT))
    }

    pub fn vsync_event(&self, id: DisplayId) -> Option<&Event> {
        self.display(id).map(Display::vsync_event)
    }

    /// Creates a layer with its own buffer queue on `display`.
    pub fn create_layer(
        &mut self,
        display: DisplayId,
        owner: ProcessId,
    ) -> Result<LayerId, NvFlingerError> {
        if self.display(display).is_none() {
            return Err(NvFlingerError::DisplayNotFound(display));
        }
        let id = LayerId::new(self.next_layer_id);
        let binder_id = BinderObjectId::new(self.next_binder_id);
        let queue = Arc::new(BufferQueue::new(binder_id, id)?);
        self.next_layer_id += 1;
        self.next_binder_id += 1;

        log::debug!(target: "Service_VI", "created {id} on {display} for {owner} ({binder_id})");
        self.layers.insert(
            id,
            Layer {
                id,
                display,
                owner,
                scaling_mode: ScalingMode::ScaleToLayer,
                queue,
            },
        );
        Ok(id)
    }

    /// Destroys a layer and disconnects its queue.
    pub fn destroy_layer(&mut self, id: LayerId) -> Result<(), NvFlingerError> {
        let layer = self
            .layers
            .remove(&id)
            .ok_or(NvFlingerError::LayerNotFound(id))?;
        layer.queue.disconnect();
        log::debug!(target: "Service_VI", "destroyed {id}");
        Ok(())
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn set_layer_scaling_mode(
        &mut self,
        id: LayerId,
        mode: ScalingMode,
    ) -> Result<(), NvFlingerError> {
        let layer = self
            .layers
            .get_mut(&id)
            .ok_or(NvFlingerError::LayerNotFound(id))?;
        layer.scaling_mode = mode;
        Ok(())
    }

    pub fn find_buffer_queue(&self, id: BinderObjectId) -> Option<Arc<BufferQueue>> {
        self.layers
            .values()
            .find(|layer| layer.queue.id() == id)
            .map(|layer| layer.queue.clone())
    }

    /// Composes one frame on every display.
    ///
    /// Each layer's oldest queued buffer is presented on the GPU of the layer
    /// owner and released. Every display's vsync event is signaled. Returns
    /// the number of presented buffers.
    pub fn compose(&self, gpus: &GpuTable) -> usize {
        let mut presented = 0;
        for layer in self.layers.values() {
            let Some(buffer) = layer.queue.acquire_buffer() else {
                continue;
            };
            match gpus.gpu(layer.owner) {
                Some(gpu) => {
                    gpu.write().present();
                    presented += 1;
                }
                None => {
                    log::warn!(target: "Service_VI", "{} owner {} has no gpu", layer.id, layer.owner);
                }
            }
            if let Err(err) = layer.queue.release_buffer(buffer.slot) {
                log::error!(target: "Service_VI", "critical: release on {} failed: {err}", layer.id);
            }
        }

        for display in &self.displays {
            if let Err(err) = display.vsync_event.signal() {
                log::error!(target: "Service_VI", "critical: vsync on {} failed: {err}", display.name);
            }
        }
        presented
    }
}

/// Error returned by [`NvFlinger`] layer operations.
#[derive(Debug, thiserror::Error)]
pub enum NvFlingerError {
    #[error("{0} does not exist")]
    DisplayNotFound(DisplayId),
    #[error("{0} does not exist")]
    LayerNotFound(LayerId),
    #[error("buffer queue setup failed")]
    Servctl(#[from] ServctlError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferTransformFlags, IgbpBuffer, MultiFence, PIXEL_FORMAT_RGBA8888, Rect};

    const OWNER: ProcessId = ProcessId::new(0x90);

    #[test]
    fn test_displays() {
        let mut flinger = NvFlinger::new().unwrap();
        let id = flinger.open_display("Default").unwrap();
        assert_eq!(id, DisplayId::new(0));
        assert_eq!(flinger.open_display("Null"), Some(DisplayId::new(4)));
        assert!(flinger.open_display("Bogus").is_none());
        assert_eq!(flinger.display_resolution(id), Some((1280, 720)));
        assert!(flinger.close_display(id));
        assert!(!flinger.close_display(id));
    }

    #[test]
    fn test_layer_lifecycle() {
        let mut flinger = NvFlinger::new().unwrap();
        assert!(matches!(
            flinger.create_layer(DisplayId::new(9), OWNER),
            Err(NvFlingerError::DisplayNotFound(_))
        ));
        let first = flinger.create_layer(DisplayId::new(0), OWNER).unwrap();
        let second = flinger.create_layer(DisplayId::new(0), OWNER).unwrap();
        assert_ne!(first, second);

        let binder = flinger.layer(second).unwrap().buffer_queue().id();
        assert!(flinger.find_buffer_queue(binder).is_some());
        flinger
            .set_layer_scaling_mode(second, ScalingMode::PreserveAspectRatio)
            .unwrap();
        assert_eq!(
            flinger.layer(second).unwrap().scaling_mode(),
            ScalingMode::PreserveAspectRatio
        );

        flinger.destroy_layer(second).unwrap();
        assert!(flinger.find_buffer_queue(binder).is_none());
        assert!(flinger.destroy_layer(second).is_err());
    }

    #[test]
    fn test_compose_presents_and_signals_vsync() {
        let mut flinger = NvFlinger::new().unwrap();
        let mut gpus = GpuTable::new();
        let gpu = gpus.grab(OWNER);
        let layer = flinger.create_layer(DisplayId::new(0), OWNER).unwrap();
        let queue = flinger.layer(layer).unwrap().buffer_queue().clone();
        queue
            .set_preallocated_buffer(0, IgbpBuffer::new(1280, 720, PIXEL_FORMAT_RGBA8888))
            .unwrap();

        assert_eq!(flinger.compose(&gpus), 0);
        assert!(flinger.vsync_event(DisplayId::new(0)).unwrap().is_signaled());

        let (slot, _) = queue.dequeue_buffer(0, 0).unwrap();
        queue
            .queue_buffer(slot, BufferTransformFlags::empty(), Rect::default(), 1, MultiFence::default())
            .unwrap();
        assert_eq!(flinger.compose(&gpus), 1);
        assert_eq!(gpu.read().frames_presented(), 1);
        assert_eq!(queue.try_dequeue_buffer(0, 0).map(|(slot, _)| slot), Some(0));
    }
}
