//! `IAsyncContext`: a pollable handle on work that finishes later.
//!
//! The producer keeps an [`AsyncContext`] and calls
//! [`complete`](AsyncContext::complete) when the work is done; the guest
//! waits on the system event, then asks for the result.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mizu_result::{RESULT_SUCCESS, Result, ResultCode, ToResultCode, kernel};
use mizu_servctl::{ServctlError, event::Event};
use parking_lot::Mutex;

use crate::{
    context::RequestContext,
    framework::{FunctionInfo, ServiceCore, ServiceFramework},
};

/// Completion state shared between the producer and the guest interface.
#[derive(Debug)]
pub struct AsyncContext {
    event: Event,
    done: AtomicBool,
    cancelled: AtomicBool,
    result: Mutex<ResultCode>,
}

impl AsyncContext {
    pub fn new() -> Result<Self, ServctlError> {
        Ok(Self {
            event: Event::new()?,
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            result: Mutex::new(RESULT_SUCCESS),
        })
    }

    /// Stores the result and signals the system event.
    ///
    /// Only the first completion counts.
    pub fn complete(&self, result: ResultCode) -> Result<(), ServctlError> {
        {
            let mut slot = self.result.lock();
            if self.done.load(Ordering::Acquire) {
                return Ok(());
            }
            *slot = result;
            self.done.store(true, Ordering::Release);
        }
        self.event.signal()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Requests cancellation. The producer decides whether to honor it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns the stored result, or `None` while the work is still running.
    pub fn result(&self) -> Option<ResultCode> {
        let slot = self.result.lock();
        self.is_done().then_some(*slot)
    }

    #[inline]
    pub fn event(&self) -> &Event {
        &self.event
    }
}

/// The guest-facing interface of an [`AsyncContext`].
pub struct IAsyncContext {
    core: ServiceCore,
    context: Arc<AsyncContext>,
}

impl IAsyncContext {
    pub fn new(context: Arc<AsyncContext>) -> Self {
        Self {
            core: ServiceCore::new("IAsyncContext"),
            context,
        }
    }

    fn get_system_event(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        ctx.response(2, 1, 0)
            .push_result(RESULT_SUCCESS)
            .push_copy_fd(self.context.event());
        Ok(())
    }

    fn cancel(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        log::debug!(target: "Service", "IAsyncContext: cancel requested");
        self.context.cancel();
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn has_done(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let done = self.context.is_done();
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push_bool(done);
        Ok(())
    }

    fn get_result(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let result = self.context.result().ok_or(kernel::INVALID_STATE)?;
        ctx.response(2, 0, 0).push_result(result);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(0, Some(Self::get_system_event), "GetSystemEvent"),
        FunctionInfo::new(1, Some(Self::cancel), "Cancel"),
        FunctionInfo::new(2, Some(Self::has_done), "HasDone"),
        FunctionInfo::new(3, Some(Self::get_result), "GetResult"),
    ];
}

impl ServiceFramework for IAsyncContext {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

impl ToResultCode for AsyncContext {
    /// The code the guest sees from `GetResult`, once done.
    fn to_result_code(&self) -> ResultCode {
        self.result().unwrap_or(kernel::INVALID_STATE)
    }
}

#[cfg(test)]
mod tests {
    use mizu_result::ERR_LDN_DISABLED;

    use super::*;

    #[test]
    fn test_complete_signals_once() {
        let context = AsyncContext::new().unwrap();
        assert!(!context.is_done());
        assert_eq!(context.result(), None);
        assert!(!context.event().is_signaled());

        context.complete(ERR_LDN_DISABLED).unwrap();
        context.complete(RESULT_SUCCESS).unwrap();
        assert!(context.is_done());
        assert!(context.event().is_signaled());
        assert_eq!(context.result(), Some(ERR_LDN_DISABLED));
        assert_eq!(context.to_result_code(), ERR_LDN_DISABLED);
    }

    #[test]
    fn test_cancel_is_advisory() {
        let context = AsyncContext::new().unwrap();
        context.cancel();
        assert!(context.is_cancelled());
        assert!(!context.is_done());
        assert_eq!(context.to_result_code(), kernel::INVALID_STATE);
    }
}
