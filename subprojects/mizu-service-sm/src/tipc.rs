//! TIPC command table of `IUserInterface`.
//!
//! TIPC commands share the CMIF ids. `GetService` differs in that it always
//! returns a handle word, zero on failure, next to the result.

use mizu_result::{RESULT_SUCCESS, Result};
use mizu_servctl::SessionHandle;
use mizu_service::{FunctionInfo, RequestContext};
use mizu_sf::ServiceName;

use crate::{
    proto::{self, RegisterServiceIn},
    service::IUserInterface,
};

impl IUserInterface {
    fn initialize_tipc(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        self.mark_initialized(ctx.pid());
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_service_tipc(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let name = ServiceName::parse_wire(ctx.pop::<u64>());
        let (code, handle) = match self.open_session(ctx, name) {
            Ok(handle) => (RESULT_SUCCESS, handle),
            Err(code) => (code, SessionHandle::INVALID),
        };
        ctx.response(2, 0, 1)
            .push_result(code)
            .push_move_handle(handle);
        Ok(())
    }

    fn register_service_tipc(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let input = ctx.pop_raw::<RegisterServiceIn>();
        let name = ServiceName::parse_wire(input.name);
        let handle = self.register_port(ctx, name, input.max_sessions)?;
        ctx.response(2, 0, 1)
            .push_result(RESULT_SUCCESS)
            .push_move_handle(handle);
        Ok(())
    }

    fn unregister_service_tipc(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let name = ServiceName::parse_wire(ctx.pop::<u64>());
        self.unregister(name)?;
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    pub(crate) const TIPC_HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(proto::REGISTER_CLIENT, Some(Self::initialize_tipc), "Initialize"),
        FunctionInfo::new(proto::GET_SERVICE_HANDLE, Some(Self::get_service_tipc), "GetServiceHandle"),
        FunctionInfo::new(proto::REGISTER_SERVICE, Some(Self::register_service_tipc), "RegisterService"),
        FunctionInfo::new(proto::UNREGISTER_SERVICE, Some(Self::unregister_service_tipc), "UnregisterService"),
        FunctionInfo::new(proto::DETACH_CLIENT, None, "DetachClient"),
    ];
}
