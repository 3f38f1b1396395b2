//! `env_logger` setup.

use env_logger::{Builder, Env};

use crate::config::LogConfig;

/// Installs the global logger with `config.filter`, unless `RUST_LOG` is set.
///
/// Returns `false` when a logger was already installed.
pub fn init(config: &LogConfig) -> bool {
    let env = Env::default().default_filter_or(config.filter.as_str());
    Builder::from_env(env)
        .format_timestamp_micros()
        .format_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let config = LogConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
