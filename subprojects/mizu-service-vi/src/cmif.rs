//! CMIF interfaces of the VI service.

pub mod application;
pub mod binder;
pub mod root;
