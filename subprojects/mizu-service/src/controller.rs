//! IPC control sub-protocol (`Control` / `ControlWithContext` messages).

use mizu_result::{ERR_SF_NOT_IMPLEMENTED, RESULT_SUCCESS, Result, ToResultCode};

use crate::context::{RequestContext, ResponseFlags};

/// Size of the server's pointer buffer, reported to clients.
pub const POINTER_BUFFER_SIZE: u16 = 0x8000;

const CONVERT_CURRENT_OBJECT_TO_DOMAIN: u32 = 0;
const COPY_FROM_CURRENT_DOMAIN: u32 = 1;
const CLONE_CURRENT_OBJECT: u32 = 2;
const QUERY_POINTER_BUFFER_SIZE: u32 = 3;
const CLONE_CURRENT_OBJECT_EX: u32 = 4;

/// Built-in handler for IPC control messages.
pub struct Controller;

impl Controller {
    pub fn handle(ctx: &mut RequestContext<'_>) -> Result<()> {
        match ctx.command() {
            CONVERT_CURRENT_OBJECT_TO_DOMAIN => Self::convert_current_object_to_domain(ctx),
            CLONE_CURRENT_OBJECT | CLONE_CURRENT_OBJECT_EX => Self::clone_current_object(ctx),
            QUERY_POINTER_BUFFER_SIZE => Self::query_pointer_buffer_size(ctx),
            COPY_FROM_CURRENT_DOMAIN => {
                ctx.report_unimplemented("IpcController", Some("CopyFromCurrentDomain"));
                Err(ERR_SF_NOT_IMPLEMENTED)
            }
            _ => {
                ctx.report_unimplemented("IpcController", None);
                Err(ERR_SF_NOT_IMPLEMENTED)
            }
        }
    }

    fn convert_current_object_to_domain(ctx: &mut RequestContext<'_>) -> Result<()> {
        log::debug!(target: "IPC", "converting session {} to a domain", ctx.session_id());
        ctx.convert_to_domain();
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(1u32);
        Ok(())
    }

    fn clone_current_object(ctx: &mut RequestContext<'_>) -> Result<()> {
        let handle = ctx
            .kernel()
            .create_session_handle(ctx.thread_id(), ctx.session_id())
            .map_err(|err| {
                log::error!(target: "IPC", "critical: failed to clone session {}: {err}", ctx.session_id());
                err.to_result_code()
            })?;
        ctx.add_session_clone();
        log::debug!(target: "IPC", "cloned session {} as {handle}", ctx.session_id());
        ctx.response_with_flags(2, 0, 1, ResponseFlags::ALWAYS_MOVE_HANDLES)
            .push_result(RESULT_SUCCESS)
            .push_move_handle(handle);
        Ok(())
    }

    fn query_pointer_buffer_size(ctx: &mut RequestContext<'_>) -> Result<()> {
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(POINTER_BUFFER_SIZE);
        Ok(())
    }
}
