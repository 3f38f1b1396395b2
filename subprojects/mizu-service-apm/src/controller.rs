//! Performance state shared by every APM interface.

use std::collections::HashMap;

use mizu_servctl::{ServctlError, event::Event};

use crate::proto::{CpuBoostMode, PerformanceConfiguration, PerformanceMode};

/// Current performance mode and the configuration selected for each mode.
#[derive(Debug)]
pub struct ApmController {
    mode: PerformanceMode,
    configurations: HashMap<PerformanceMode, PerformanceConfiguration>,
    cpu_overclock: bool,
    boost_mode: CpuBoostMode,
    performance_event: Event,
}

impl ApmController {
    pub fn new() -> Result<Self, ServctlError> {
        Ok(Self {
            mode: PerformanceMode::Normal,
            configurations: HashMap::new(),
            cpu_overclock: false,
            boost_mode: CpuBoostMode::Normal,
            performance_event: Event::new()?,
        })
    }

    #[inline]
    pub fn mode(&self) -> PerformanceMode {
        self.mode
    }

    /// Switches the mode, signaling the performance event on a change.
    pub fn set_mode(&mut self, mode: PerformanceMode) {
        if mode == self.mode {
            return;
        }
        log::debug!(target: "Service_APM", "performance mode {:?} -> {mode:?}", self.mode);
        self.mode = mode;
        if let Err(err) = self.performance_event.signal() {
            log::error!(target: "Service_APM", "critical: failed to signal performance event: {err}");
        }
    }

    pub fn set_performance_configuration(
        &mut self,
        mode: PerformanceMode,
        config: PerformanceConfiguration,
    ) {
        log::debug!(target: "Service_APM", "{mode:?} configuration = {:#010x}", config.0);
        self.configurations.insert(mode, config);
    }

    pub fn performance_configuration(&self, mode: PerformanceMode) -> PerformanceConfiguration {
        self.configurations
            .get(&mode)
            .copied()
            .unwrap_or(PerformanceConfiguration::default_for(mode))
    }

    /// Configuration of the current mode.
    pub fn current_performance_configuration(&self) -> PerformanceConfiguration {
        self.performance_configuration(self.mode)
    }

    /// Applies a CPU boost. Only the normal mode configuration changes.
    pub fn set_cpu_boost_mode(&mut self, boost: CpuBoostMode) {
        self.boost_mode = boost;
        self.set_performance_configuration(PerformanceMode::Normal, boost.configuration());
    }

    #[inline]
    pub fn cpu_boost_mode(&self) -> CpuBoostMode {
        self.boost_mode
    }

    pub fn set_cpu_overclock_enabled(&mut self, enabled: bool) {
        self.cpu_overclock = enabled;
    }

    #[inline]
    pub fn is_cpu_overclock_enabled(&self) -> bool {
        self.cpu_overclock
    }

    #[inline]
    pub fn performance_event(&self) -> &Event {
        &self.performance_event
    }
}
