//! # mizu-sync
//!
//! Shared state cells for service threads.

mod shared;

pub use self::shared::{Shared, SharedReader, SharedWriter};
