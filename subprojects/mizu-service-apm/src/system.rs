//! `ISystemManager` (`apm:sys`).

use mizu_result::{RESULT_SUCCESS, Result, kernel};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    controller::ApmController,
    manager::pop_mode,
    proto::{
        CMD_GET_CURRENT_PERFORMANCE_CONFIGURATION, CMD_GET_PERFORMANCE_EVENT,
        CMD_REQUEST_PERFORMANCE_MODE, CMD_SET_CPU_BOOST_MODE, CpuBoostMode, SERVICE_NAME_SYSTEM,
    },
};

/// System-side APM interface.
pub struct ISystemManager {
    core: ServiceCore,
    controller: Shared<ApmController>,
}

impl ISystemManager {
    pub fn new(controller: Shared<ApmController>) -> Self {
        Self {
            core: ServiceCore::new(SERVICE_NAME_SYSTEM),
            controller,
        }
    }

    fn request_performance_mode(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mode = pop_mode(ctx)?;
        self.controller.write().set_mode(mode);
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_performance_event(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let controller = self.controller.read();
        ctx.response(2, 1, 0)
            .push_result(RESULT_SUCCESS)
            .push_copy_fd(controller.performance_event());
        Ok(())
    }

    fn set_cpu_boost_mode(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let boost = ctx
            .pop_enum::<CpuBoostMode>()
            .ok_or(kernel::INVALID_ARGUMENT)?;
        log::debug!(target: "Service_APM", "cpu boost mode = {boost:?}");
        self.controller.write().set_cpu_boost_mode(boost);
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_current_performance_configuration(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let config = self.controller.read().current_performance_configuration();
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(config.0);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(CMD_REQUEST_PERFORMANCE_MODE, Some(Self::request_performance_mode), "RequestPerformanceMode"),
        FunctionInfo::new(CMD_GET_PERFORMANCE_EVENT, Some(Self::get_performance_event), "GetPerformanceEvent"),
        FunctionInfo::new(2, None, "GetThrottlingState"),
        FunctionInfo::new(3, None, "GetLastThrottlingState"),
        FunctionInfo::new(4, None, "ClearLastThrottlingState"),
        FunctionInfo::new(5, None, "LoadAndApplySettings"),
        FunctionInfo::new(CMD_SET_CPU_BOOST_MODE, Some(Self::set_cpu_boost_mode), "SetCpuBoostMode"),
        FunctionInfo::new(CMD_GET_CURRENT_PERFORMANCE_CONFIGURATION, Some(Self::get_current_performance_configuration), "GetCurrentPerformanceConfiguration"),
    ];
}

impl ServiceFramework for ISystemManager {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}
