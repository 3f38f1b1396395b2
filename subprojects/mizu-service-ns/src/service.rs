//! `IApplicationManagerInterface` on `ns:am2`.

use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, Result};
use mizu_servctl::ProcessId;
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    language::{ApplicationLanguage, LanguageCode, get_desired_language},
    proto::{
        CMD_CONVERT_APPLICATION_LANGUAGE_TO_LANGUAGE_CODE, CMD_GET_APPLICATION_DESIRED_LANGUAGE,
        ERR_APPLICATION_LANGUAGE_NOT_FOUND, SERVICE_NAME,
    },
};

/// Supplies the system language when a session opens.
pub trait LanguageSource: Send + Sync {
    /// Reads the configured language. `None` keeps the current one.
    fn reload(&self) -> Option<LanguageCode>;
}

impl<F> LanguageSource for F
where
    F: Fn() -> Option<LanguageCode> + Send + Sync,
{
    fn reload(&self) -> Option<LanguageCode> {
        self()
    }
}

pub struct IApplicationManagerInterface {
    core: ServiceCore,
    language: Shared<LanguageCode>,
    source: Arc<dyn LanguageSource>,
}

impl IApplicationManagerInterface {
    pub fn new(language: LanguageCode, source: Arc<dyn LanguageSource>) -> Self {
        Self {
            core: ServiceCore::new(SERVICE_NAME),
            language: Shared::new(language),
            source,
        }
    }

    /// Current system language code.
    pub fn language(&self) -> LanguageCode {
        *self.language.read()
    }

    fn system_language(&self) -> Result<ApplicationLanguage> {
        let code = self.language();
        ApplicationLanguage::from_language_code(code).ok_or_else(|| {
            log::warn!(target: "Service_NS", "system language {code} has no application language");
            ERR_APPLICATION_LANGUAGE_NOT_FOUND
        })
    }

    fn get_application_desired_language(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let supported = ctx.pop::<u32>();
        let current = self.system_language()?;
        let desired = get_desired_language(current, supported);
        log::debug!(
            target: "Service_NS",
            "desired language for mask {supported:#06x} is {desired:?} (system {current:?})"
        );
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push_enum(desired);
        Ok(())
    }

    fn convert_application_language_to_language_code(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let lang = ctx
            .pop_enum::<ApplicationLanguage>()
            .ok_or(ERR_APPLICATION_LANGUAGE_NOT_FOUND)?;
        ctx.response(4, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(lang.language_code().to_raw());
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(0, None, "ListApplicationRecord"),
        FunctionInfo::new(1, None, "GenerateApplicationRecordCount"),
        FunctionInfo::new(2, None, "GetApplicationRecordUpdateSystemEvent"),
        FunctionInfo::new(400, None, "GetApplicationControlData"),
        FunctionInfo::new(403, None, "GetMaxApplicationControlCacheCount"),
        FunctionInfo::new(
            CMD_GET_APPLICATION_DESIRED_LANGUAGE,
            Some(Self::get_application_desired_language),
            "GetApplicationDesiredLanguage",
        ),
        FunctionInfo::new(
            CMD_CONVERT_APPLICATION_LANGUAGE_TO_LANGUAGE_CODE,
            Some(Self::convert_application_language_to_language_code),
            "ConvertApplicationLanguageToLanguageCode",
        ),
    ];
}

impl ServiceFramework for IApplicationManagerInterface {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }

    fn setup_session(&self, pid: ProcessId) {
        if let Some(code) = self.source.reload() {
            let mut language = self.language.write();
            if *language != code {
                log::debug!(target: "Service_NS", "system language {} -> {code} for {pid}", *language);
                *language = code;
            }
        }
    }
}
