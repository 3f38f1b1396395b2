//! `IManagerRootService` (`vi:m`).

use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, Result};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    cmif::application::IApplicationDisplayService,
    nvflinger::NvFlinger,
    proto::{SERVICE_NAME_MANAGER, root_cmds},
};

pub struct IManagerRootService {
    core: ServiceCore,
    nv_flinger: Shared<NvFlinger>,
}

impl IManagerRootService {
    pub fn new(nv_flinger: Shared<NvFlinger>) -> Self {
        Self {
            core: ServiceCore::new(SERVICE_NAME_MANAGER),
            nv_flinger,
        }
    }

    fn get_display_service(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let policy = ctx.pop::<u32>();
        log::debug!(target: "Service_VI", "GetDisplayService(policy={policy})");
        ctx.response(2, 0, 1)
            .push_result(RESULT_SUCCESS)
            .push_ipc_interface(Arc::new(IApplicationDisplayService::new(
                self.nv_flinger.clone(),
            )));
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(
            root_cmds::GET_DISPLAY_SERVICE_MANAGER,
            Some(Self::get_display_service),
            "GetDisplayService",
        ),
        FunctionInfo::new(
            root_cmds::GET_DISPLAY_SERVICE_WITH_PROXY_NAME_EXCHANGE,
            None,
            "GetDisplayServiceWithProxyNameExchange",
        ),
    ];
}

impl ServiceFramework for IManagerRootService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}
