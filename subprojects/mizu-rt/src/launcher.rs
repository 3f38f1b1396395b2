//! The guest launcher queue.
//!
//! `hlaunch` posts one absolute guest path per message to a POSIX message
//! queue. The loader on the other end is external; the runtime only makes
//! sure the queue exists.

use std::{
    ffi::{CString, OsString},
    io,
    os::unix::ffi::{OsStrExt, OsStringExt},
    path::{Path, PathBuf},
};

use crate::config::LoaderConfig;

/// One end of the launcher queue. Closed on drop.
#[derive(Debug)]
pub struct LauncherQueue {
    mqd: libc::mqd_t,
    name: CString,
    message_size: usize,
}

impl LauncherQueue {
    /// Opens the queue for receiving, creating it when it is missing.
    pub fn open_or_create(config: &LoaderConfig) -> Result<Self, LauncherError> {
        let name = queue_name(&config.queue)?;
        // SAFETY: all-zero is a valid `mq_attr`.
        let mut attr: libc::mq_attr = unsafe { core::mem::zeroed() };
        attr.mq_maxmsg = config.max_messages as libc::c_long;
        attr.mq_msgsize = config.message_size as libc::c_long;

        // SAFETY: `name` is NUL-terminated and `attr` outlives the call.
        let mqd = unsafe {
            libc::mq_open(
                name.as_ptr(),
                libc::O_RDONLY | libc::O_CREAT,
                0o622 as libc::mode_t,
                &attr as *const libc::mq_attr,
            )
        };
        let queue = Self::from_raw(mqd, name, "mq_open")?;
        log::debug!(target: "Loader", "queue {} open, {} byte messages", config.queue, queue.message_size);
        Ok(queue)
    }

    /// Opens an existing queue for sending.
    pub fn open_sender(name: &str) -> Result<Self, LauncherError> {
        let name = queue_name(name)?;
        // SAFETY: `name` is NUL-terminated.
        let mqd = unsafe { libc::mq_open(name.as_ptr(), libc::O_WRONLY) };
        Self::from_raw(mqd, name, "mq_open")
    }

    fn from_raw(mqd: libc::mqd_t, name: CString, op: &'static str) -> Result<Self, LauncherError> {
        if mqd == -1 {
            return Err(LauncherError::os(op));
        }
        let mut queue = Self {
            mqd,
            name,
            message_size: 0,
        };
        // SAFETY: all-zero is a valid `mq_attr`.
        let mut attr: libc::mq_attr = unsafe { core::mem::zeroed() };
        // SAFETY: `queue.mqd` is open and `attr` is writable.
        if unsafe { libc::mq_getattr(queue.mqd, &mut attr) } == -1 {
            return Err(LauncherError::os("mq_getattr"));
        }
        queue.message_size = usize::try_from(attr.mq_msgsize).unwrap_or(0);
        Ok(queue)
    }

    /// Largest message the queue accepts.
    #[inline]
    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Posts `path`, which must be absolute.
    pub fn send(&self, path: &Path) -> Result<(), LauncherError> {
        if !path.is_absolute() {
            return Err(LauncherError::NotAbsolute(path.to_owned()));
        }
        let bytes = path.as_os_str().as_bytes();
        if bytes.len() > self.message_size {
            return Err(LauncherError::TooLong {
                len: bytes.len(),
                max: self.message_size,
            });
        }
        // SAFETY: `bytes` is valid for `bytes.len()` bytes.
        let rc = unsafe { libc::mq_send(self.mqd, bytes.as_ptr().cast(), bytes.len(), 0) };
        if rc == -1 {
            return Err(LauncherError::os("mq_send"));
        }
        log::debug!(target: "Loader", "queued {}", path.display());
        Ok(())
    }

    /// Blocks until a path arrives.
    pub fn receive(&self) -> Result<PathBuf, LauncherError> {
        let mut buf = vec![0u8; self.message_size];
        // SAFETY: `buf` is writable for its whole length.
        let len = unsafe {
            libc::mq_receive(
                self.mqd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                core::ptr::null_mut(),
            )
        };
        let len = usize::try_from(len).map_err(|_| LauncherError::os("mq_receive"))?;
        buf.truncate(len);
        Ok(PathBuf::from(OsString::from_vec(buf)))
    }

    /// Removes the queue name. Open descriptors stay usable.
    pub fn unlink(name: &str) -> Result<(), LauncherError> {
        let name = queue_name(name)?;
        // SAFETY: `name` is NUL-terminated.
        if unsafe { libc::mq_unlink(name.as_ptr()) } == -1 {
            return Err(LauncherError::os("mq_unlink"));
        }
        Ok(())
    }
}

impl Drop for LauncherQueue {
    fn drop(&mut self) {
        // SAFETY: `self.mqd` is open and closed only here.
        if unsafe { libc::mq_close(self.mqd) } == -1 {
            log::warn!(
                target: "Loader",
                "mq_close({:?}) failed: {}",
                self.name,
                io::Error::last_os_error()
            );
        }
    }
}

fn queue_name(name: &str) -> Result<CString, LauncherError> {
    let valid = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
    if !valid {
        return Err(LauncherError::InvalidName(name.to_owned()));
    }
    CString::new(name).map_err(|_| LauncherError::InvalidName(name.to_owned()))
}

/// Error returned by [`LauncherQueue`].
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("invalid queue name {0:?}")]
    InvalidName(String),
    #[error("{} is not an absolute path", .0.display())]
    NotAbsolute(PathBuf),
    #[error("path is {len} bytes, the queue takes at most {max}")]
    TooLong { len: usize, max: usize },
    #[error("{op} failed")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl LauncherError {
    fn os(op: &'static str) -> Self {
        Self::Os {
            op,
            source: io::Error::last_os_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn unique_config() -> LoaderConfig {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        LoaderConfig {
            queue: format!(
                "/mizu_test_{}_{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ),
            max_messages: 4,
            message_size: 256,
        }
    }

    #[test]
    fn test_queue_names() {
        assert!(queue_name("/mizu_loader").is_ok());
        for bad in ["", "/", "mizu_loader", "/mizu/loader", "/mi\0zu"] {
            assert!(matches!(queue_name(bad), Err(LauncherError::InvalidName(_))));
        }
    }

    #[test]
    fn test_send_then_receive() {
        let config = unique_config();
        let receiver = LauncherQueue::open_or_create(&config).unwrap();
        assert_eq!(receiver.message_size(), 256);

        let sender = LauncherQueue::open_sender(&config.queue).unwrap();
        sender.send(Path::new("/games/hello.nro")).unwrap();
        assert_eq!(receiver.receive().unwrap(), PathBuf::from("/games/hello.nro"));

        LauncherQueue::unlink(&config.queue).unwrap();
    }

    #[test]
    fn test_send_rejects_bad_paths() {
        let config = unique_config();
        let receiver = LauncherQueue::open_or_create(&config).unwrap();
        let sender = LauncherQueue::open_sender(&config.queue).unwrap();

        assert!(matches!(
            sender.send(Path::new("hello.nro")),
            Err(LauncherError::NotAbsolute(_))
        ));
        let long = PathBuf::from(format!("/{}", "a".repeat(300)));
        assert!(matches!(
            sender.send(&long),
            Err(LauncherError::TooLong { len: 301, max: 256 })
        ));

        drop(receiver);
        LauncherQueue::unlink(&config.queue).unwrap();
    }

    #[test]
    fn test_open_sender_needs_queue() {
        let config = unique_config();
        assert!(matches!(
            LauncherQueue::open_sender(&config.queue),
            Err(LauncherError::Os { op: "mq_open", .. })
        ));
    }
}
