//! `IManager` (`apm`, `apm:p`, `apm:am`) and the `ISession` it opens.

use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, Result, kernel};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    controller::ApmController,
    proto::{
        CMD_GET_PERFORMANCE_CONFIGURATION, CMD_GET_PERFORMANCE_MODE, CMD_IS_CPU_OVERCLOCK_ENABLED,
        CMD_OPEN_SESSION, CMD_SET_CPU_OVERCLOCK_ENABLED, CMD_SET_PERFORMANCE_CONFIGURATION,
        PerformanceConfiguration, PerformanceMode,
    },
};

pub(crate) fn pop_mode(ctx: &mut RequestContext<'_>) -> Result<PerformanceMode> {
    let raw = ctx.pop::<i32>();
    match PerformanceMode::from_raw(raw) {
        Some(mode) if mode.is_valid() => Ok(mode),
        _ => {
            log::warn!(target: "Service_APM", "invalid performance mode {raw}");
            Err(kernel::INVALID_ARGUMENT)
        }
    }
}

/// APM manager interface.
pub struct IManager {
    core: ServiceCore,
    controller: Shared<ApmController>,
}

impl IManager {
    pub fn new(name: &str, controller: Shared<ApmController>) -> Self {
        Self {
            core: ServiceCore::new(name),
            controller,
        }
    }

    fn open_session(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let session = Arc::new(ISession::new(self.controller.clone()));
        ctx.response(2, 0, 1)
            .push_result(RESULT_SUCCESS)
            .push_ipc_interface(session);
        Ok(())
    }

    fn get_performance_mode(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mode = self.controller.read().mode();
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(mode as i32);
        Ok(())
    }

    fn is_cpu_overclock_enabled(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let enabled = self.controller.read().is_cpu_overclock_enabled();
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push_bool(enabled);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(CMD_OPEN_SESSION, Some(Self::open_session), "OpenSession"),
        FunctionInfo::new(CMD_GET_PERFORMANCE_MODE, Some(Self::get_performance_mode), "GetPerformanceMode"),
        FunctionInfo::new(2, None, "GetPerformanceEvent"),
        FunctionInfo::new(3, None, "GetThrottlingState"),
        FunctionInfo::new(4, None, "GetLastThrottlingState"),
        FunctionInfo::new(5, None, "ClearLastThrottlingState"),
        FunctionInfo::new(CMD_IS_CPU_OVERCLOCK_ENABLED, Some(Self::is_cpu_overclock_enabled), "IsCpuOverclockEnabled"),
    ];
}

impl ServiceFramework for IManager {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

/// Per-client performance configuration interface.
pub struct ISession {
    core: ServiceCore,
    controller: Shared<ApmController>,
}

impl ISession {
    pub fn new(controller: Shared<ApmController>) -> Self {
        Self {
            core: ServiceCore::new("ISession"),
            controller,
        }
    }

    fn set_performance_configuration(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mode = pop_mode(ctx)?;
        let config = PerformanceConfiguration(ctx.pop::<u32>());
        self.controller
            .write()
            .set_performance_configuration(mode, config);
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_performance_configuration(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mode = pop_mode(ctx)?;
        let config = self.controller.read().performance_configuration(mode);
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(config.0);
        Ok(())
    }

    fn set_cpu_overclock_enabled(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let enabled = ctx.pop_bool();
        log::debug!(target: "Service_APM", "cpu overclock enabled = {enabled}");
        self.controller.write().set_cpu_overclock_enabled(enabled);
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(CMD_SET_PERFORMANCE_CONFIGURATION, Some(Self::set_performance_configuration), "SetPerformanceConfiguration"),
        FunctionInfo::new(CMD_GET_PERFORMANCE_CONFIGURATION, Some(Self::get_performance_configuration), "GetPerformanceConfiguration"),
        FunctionInfo::new(CMD_SET_CPU_OVERCLOCK_ENABLED, Some(Self::set_cpu_overclock_enabled), "SetCpuOverclockEnabled"),
    ];
}

impl ServiceFramework for ISession {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}
