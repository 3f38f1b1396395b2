//! State shared by every service thread.

use std::{path::PathBuf, sync::Arc};

use mizu_servctl::{HostKernel, Kernel, LoopbackKernel, ServctlError, timer::TimerQueue};
use mizu_service::{Reporter, ThreadDirectory};
use mizu_service_nv::GpuTable;
use mizu_service_ns::{LanguageCode, LanguageSource};
use mizu_service_sm::ServiceManager;
use mizu_service_vi::NvFlinger;
use mizu_sync::Shared;

use crate::config::{Backend, Config};

/// Where the configuration came from, for reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built in memory. Reloads keep it.
    Fixed,
    /// Read from a file. Reloads read the file again.
    File(PathBuf),
}

impl ConfigSource {
    /// Rereads the configuration into `config`, returning the language.
    ///
    /// Errors are logged and leave `config` untouched.
    fn reload(&self, config: &Shared<Config>) -> Option<LanguageCode> {
        let Self::File(path) = self else {
            return Some(config.read().language_code());
        };
        match Config::load_from(path) {
            Ok(fresh) => {
                let language = fresh.language_code();
                *config.write() = fresh;
                Some(language)
            }
            Err(err) => {
                log::warn!(target: "Config", "reload of {} failed: {err}", path.display());
                None
            }
        }
    }
}

/// The service fabric: registry, compositor, GPU tables and the kernel.
pub struct System {
    config: Shared<Config>,
    source: ConfigSource,
    kernel: Arc<dyn Kernel>,
    directory: Arc<ThreadDirectory>,
    service_manager: Shared<ServiceManager>,
    nv_flinger: Shared<NvFlinger>,
    gpus: Shared<GpuTable>,
    reporter: Shared<Reporter>,
    timers: TimerQueue,
}

impl System {
    pub fn new(config: Config, kernel: Arc<dyn Kernel>) -> Result<Self, ServctlError> {
        Ok(Self {
            config: Shared::new(config),
            source: ConfigSource::Fixed,
            kernel,
            directory: Arc::new(ThreadDirectory::new()),
            service_manager: Shared::new(ServiceManager::new()),
            nv_flinger: Shared::new(NvFlinger::new()?),
            gpus: Shared::new(GpuTable::new()),
            reporter: Shared::new(Reporter::default()),
            timers: TimerQueue::new()?,
        })
    }

    /// Builds the system with the kernel selected by `config.servctl`.
    pub fn with_backend(config: Config) -> Result<Self, ServctlError> {
        let kernel: Arc<dyn Kernel> = match config.servctl.backend {
            Backend::Host => Arc::new(HostKernel::new(config.servctl.syscall_nr as libc::c_long)),
            Backend::Loopback => Arc::new(LoopbackKernel::new()),
        };
        log::info!(target: "Kernel", "servctl backend {:?}", config.servctl.backend);
        Self::new(config, kernel)
    }

    /// Makes future reloads read `path`.
    pub fn reload_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = ConfigSource::File(path.into());
        self
    }

    #[inline]
    pub fn config(&self) -> &Shared<Config> {
        &self.config
    }

    #[inline]
    pub fn config_source(&self) -> &ConfigSource {
        &self.source
    }

    /// Rereads the configuration. Returns the language it names.
    pub fn reload_config(&self) -> Option<LanguageCode> {
        self.source.reload(&self.config)
    }

    /// Language source handed to `ns:am2`.
    pub fn language_source(&self) -> Arc<dyn LanguageSource> {
        let config = self.config.clone();
        let source = self.source.clone();
        Arc::new(move || source.reload(&config))
    }

    #[inline]
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    #[inline]
    pub fn directory(&self) -> &Arc<ThreadDirectory> {
        &self.directory
    }

    #[inline]
    pub fn service_manager(&self) -> &Shared<ServiceManager> {
        &self.service_manager
    }

    #[inline]
    pub fn nv_flinger(&self) -> &Shared<NvFlinger> {
        &self.nv_flinger
    }

    #[inline]
    pub fn gpus(&self) -> &Shared<GpuTable> {
        &self.gpus
    }

    #[inline]
    pub fn reporter(&self) -> &Shared<Reporter> {
        &self.reporter
    }

    #[inline]
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn loopback(config: Config) -> System {
        System::new(config, Arc::new(LoopbackKernel::new())).unwrap()
    }

    #[test]
    fn test_fixed_source_keeps_language() {
        let system = loopback(Config::from_toml_str("[system]\nlanguage = \"de\"\n").unwrap());
        assert_eq!(system.reload_config(), Some(LanguageCode::DE));
        assert_eq!(system.language_source().reload(), Some(LanguageCode::DE));
    }

    #[test]
    fn test_file_source_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[system]\nlanguage = \"ja\"\n").unwrap();
        let system = loopback(Config::load_from(&path).unwrap()).reload_from(&path);
        assert_eq!(system.config().read().language_code(), LanguageCode::JA);

        fs::write(&path, "[system]\nlanguage = \"fr\"\n").unwrap();
        let source = system.language_source();
        assert_eq!(source.reload(), Some(LanguageCode::FR));
        assert_eq!(system.config().read().language_code(), LanguageCode::FR);
    }

    #[test]
    fn test_broken_reload_keeps_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[system]\nlanguage = \"ko\"\n").unwrap();
        let system = loopback(Config::load_from(&path).unwrap()).reload_from(&path);

        fs::write(&path, "[system\n").unwrap();
        assert_eq!(system.reload_config(), None);
        assert_eq!(system.config().read().language_code(), LanguageCode::KO);
    }

    #[test]
    fn test_backend_selection() {
        let config = Config::from_toml_str("[servctl]\nbackend = \"loopback\"\n").unwrap();
        let system = System::with_backend(config).unwrap();
        assert!(system.service_manager().read().is_empty());
        assert_eq!(system.config_source(), &ConfigSource::Fixed);
    }
}
