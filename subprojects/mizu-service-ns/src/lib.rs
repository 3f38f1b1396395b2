//! Application language selection (`ns:am2`).
//!
//! The language tables live in [`language`]. The service re-reads the system
//! language through a [`LanguageSource`] whenever a session opens.

pub mod language;
mod proto;
mod service;

pub use self::{
    language::{ApplicationLanguage, LanguageCode, get_desired_language},
    proto::{ERR_APPLICATION_LANGUAGE_NOT_FOUND, SERVICE_NAME},
    service::{IApplicationManagerInterface, LanguageSource},
};
