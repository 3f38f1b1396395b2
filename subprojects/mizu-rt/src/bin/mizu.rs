//! Starts the service fabric and serves until SIGINT or SIGTERM.

use std::{io, process::ExitCode, sync::Arc};

use anyhow::Context;
use mizu_rt::{Config, LauncherQueue, System, logging, start_services};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("critical: {err:#}");
            eprintln!("mizu: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let path = Config::path();
    let config = Config::load_from(&path).with_context(|| format!("loading {}", path.display()))?;
    logging::init(&config.log);

    // Every thread spawned below inherits the mask.
    let signals = block_termination().context("blocking termination signals")?;

    let loader = config.loader.clone();
    let system = Arc::new(
        System::with_backend(config)
            .context("creating the system")?
            .reload_from(path),
    );
    let services = start_services(&system).context("starting services")?;
    let _queue = LauncherQueue::open_or_create(&loader)
        .with_context(|| format!("opening launcher queue {}", loader.queue))?;

    let signal = wait_for(&signals).context("waiting for a termination signal")?;
    log::info!("signal {signal}, shutting down");
    services.shutdown().context("stopping services")?;
    Ok(())
}

fn block_termination() -> io::Result<libc::sigset_t> {
    // SAFETY: `set` is initialised by `sigemptyset` before use.
    unsafe {
        let mut set: libc::sigset_t = core::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        match libc::pthread_sigmask(libc::SIG_BLOCK, &set, core::ptr::null_mut()) {
            0 => Ok(set),
            errno => Err(io::Error::from_raw_os_error(errno)),
        }
    }
}

fn wait_for(set: &libc::sigset_t) -> io::Result<libc::c_int> {
    let mut signal = 0;
    // SAFETY: `set` is a valid signal set and `signal` is writable.
    match unsafe { libc::sigwait(set, &mut signal) } {
        0 => Ok(signal),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}
