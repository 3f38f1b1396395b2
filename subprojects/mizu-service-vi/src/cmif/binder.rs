//! `IHOSBinderDriver` (`dispdrv`, and the relay handed out by
//! `GetRelayService`).

use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, Result};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    binder,
    buffer_queue::BufferQueue,
    nvflinger::NvFlinger,
    proto::{ERR_VI_NOT_FOUND, ERR_VI_OPERATION_FAILED, binder_cmds},
    types::BinderObjectId,
};

pub struct IHOSBinderDriver {
    core: ServiceCore,
    nv_flinger: Shared<NvFlinger>,
}

impl IHOSBinderDriver {
    pub fn new(name: &str, nv_flinger: Shared<NvFlinger>) -> Self {
        Self {
            core: ServiceCore::new(name),
            nv_flinger,
        }
    }

    fn buffer_queue(&self, id: BinderObjectId) -> Result<Arc<BufferQueue>> {
        // The compositor lock is released here too.
        let queue = self.nv_flinger.read().find_buffer_queue(id);
        queue.ok_or_else(|| {
            log::error!(target: "Service_VI", "unknown {id}");
            ERR_VI_NOT_FOUND
        })
    }

    fn transact_parcel(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = BinderObjectId::new(ctx.pop::<i32>());
        let code = ctx.pop::<u32>();
        let flags = ctx.pop::<u32>();
        log::trace!(target: "Service_VI", "TransactParcel({id}, code={code}, flags={flags:#x})");

        let (queue, input) = {
            let _guard = self.lock_service();
            (self.buffer_queue(id)?, ctx.read_buffer(0)?)
        };
        // Unlocked: DequeueBuffer blocks until a slot frees up.
        let reply = binder::transact(&queue, code, &input).map_err(|err| {
            log::error!(target: "Service_VI", "transaction {code} on {id} failed: {err}");
            ERR_VI_OPERATION_FAILED
        })?;

        let _guard = self.lock_service();
        ctx.write_buffer(0, &reply)?;
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn adjust_refcount(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = BinderObjectId::new(ctx.pop::<i32>());
        let add_value = ctx.pop::<i32>();
        let kind = ctx.pop::<i32>();
        log::debug!(target: "Service_VI", "AdjustRefcount({id}, {add_value}, type={kind})");
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_native_handle(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = BinderObjectId::new(ctx.pop::<i32>());
        let kind = ctx.pop::<u32>();
        log::debug!(target: "Service_VI", "GetNativeHandle({id}, type={kind})");

        let queue = self.buffer_queue(id)?;
        ctx.response(2, 1, 0)
            .push_result(RESULT_SUCCESS)
            .push_copy_fd(queue.wait_event());
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::unserialized(
            binder_cmds::TRANSACT_PARCEL,
            Some(Self::transact_parcel),
            "TransactParcel",
        ),
        FunctionInfo::new(
            binder_cmds::ADJUST_REFCOUNT,
            Some(Self::adjust_refcount),
            "AdjustRefcount",
        ),
        FunctionInfo::new(
            binder_cmds::GET_NATIVE_HANDLE,
            Some(Self::get_native_handle),
            "GetNativeHandle",
        ),
        FunctionInfo::unserialized(
            binder_cmds::TRANSACT_PARCEL_AUTO,
            Some(Self::transact_parcel),
            "TransactParcelAuto",
        ),
    ];
}

impl ServiceFramework for IHOSBinderDriver {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

#[cfg(test)]
mod tests {
    use mizu_service::find_function;

    use super::*;

    #[test]
    fn test_transactions_dispatch_unlocked() {
        let table = IHOSBinderDriver::handlers();
        for id in [binder_cmds::TRANSACT_PARCEL, binder_cmds::TRANSACT_PARCEL_AUTO] {
            assert!(!find_function(table, id).unwrap().serialized);
        }
        assert!(find_function(table, binder_cmds::GET_NATIVE_HANDLE).unwrap().serialized);
    }
}
