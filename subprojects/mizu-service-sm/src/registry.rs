//! Named service registry.

use std::{collections::HashMap, sync::Arc};

use mizu_result::{
    ERR_SM_ALREADY_REGISTERED, ERR_SM_NOT_REGISTERED, ResultCode, ToResultCode,
};
use mizu_servctl::ThreadId;
use mizu_service::SessionHandler;
use mizu_sf::{ServiceName, ServiceNameError};

/// One registered service.
#[derive(Clone)]
pub struct ServiceRecord {
    pub name: ServiceName,
    pub max_sessions: u32,
    /// Local handler. `None` for ports registered by guests.
    pub handler: Option<Arc<dyn SessionHandler>>,
    /// Thread serving the sessions, [`ThreadId::ANONYMOUS`] for guest ports.
    pub owner: ThreadId,
}

impl core::fmt::Debug for ServiceRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceRecord")
            .field("name", &self.name)
            .field("max_sessions", &self.max_sessions)
            .field("handler", &self.handler.as_ref().map(|h| h.name().to_owned()))
            .field("owner", &self.owner)
            .finish()
    }
}

/// The registry behind `sm:`.
#[derive(Debug, Default)]
pub struct ServiceManager {
    services: HashMap<ServiceName, ServiceRecord>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `name` is 1 to 8 printable ASCII bytes.
    pub fn validate_name(name: &str) -> Result<ServiceName, ServiceNameError> {
        ServiceName::validate(name)
    }

    pub fn register_service(
        &mut self,
        name: &str,
        max_sessions: u32,
        handler: Option<Arc<dyn SessionHandler>>,
        owner: ThreadId,
    ) -> Result<(), RegisterServiceError> {
        let name = Self::validate_name(name)?;
        if self.services.contains_key(&name) {
            return Err(RegisterServiceError::AlreadyRegistered(name));
        }
        log::debug!(target: "Service_SM", "registered {name} on {owner:?}");
        self.services.insert(
            name,
            ServiceRecord {
                name,
                max_sessions,
                handler,
                owner,
            },
        );
        Ok(())
    }

    pub fn unregister_service(&mut self, name: &str) -> Result<ServiceRecord, UnregisterServiceError> {
        let name = Self::validate_name(name)?;
        let record = self
            .services
            .remove(&name)
            .ok_or(UnregisterServiceError::NotRegistered(name))?;
        log::debug!(target: "Service_SM", "unregistered {name}");
        Ok(record)
    }

    pub fn get_service(&self, name: &str) -> Result<ServiceRecord, GetServiceError> {
        let name = Self::validate_name(name)?;
        self.services
            .get(&name)
            .cloned()
            .ok_or(GetServiceError::NotRegistered(name))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        ServiceName::validate(name).is_ok_and(|name| self.services.contains_key(&name))
    }

    /// Drops every record served by `owner`. Returns how many were removed.
    pub fn unregister_owned_by(&mut self, owner: ThreadId) -> usize {
        let before = self.services.len();
        self.services.retain(|_, record| record.owner != owner);
        before - self.services.len()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort();
        names
    }
}

/// Error returned by [`ServiceManager::register_service`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterServiceError {
    #[error("invalid service name")]
    InvalidName(#[from] ServiceNameError),
    #[error("service {0} is already registered")]
    AlreadyRegistered(ServiceName),
}

impl ToResultCode for RegisterServiceError {
    fn to_result_code(&self) -> ResultCode {
        match self {
            Self::InvalidName(err) => err.to_result_code(),
            Self::AlreadyRegistered(_) => ERR_SM_ALREADY_REGISTERED,
        }
    }
}

/// Error returned by [`ServiceManager::unregister_service`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnregisterServiceError {
    #[error("invalid service name")]
    InvalidName(#[from] ServiceNameError),
    #[error("service {0} is not registered")]
    NotRegistered(ServiceName),
}

impl ToResultCode for UnregisterServiceError {
    fn to_result_code(&self) -> ResultCode {
        match self {
            Self::InvalidName(err) => err.to_result_code(),
            Self::NotRegistered(_) => ERR_SM_NOT_REGISTERED,
        }
    }
}

/// Error returned by [`ServiceManager::get_service`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GetServiceError {
    #[error("invalid service name")]
    InvalidName(#[from] ServiceNameError),
    #[error("service {0} is not registered")]
    NotRegistered(ServiceName),
}

impl ToResultCode for GetServiceError {
    fn to_result_code(&self) -> ResultCode {
        match self {
            Self::InvalidName(err) => err.to_result_code(),
            Self::NotRegistered(_) => ERR_SM_NOT_REGISTERED,
        }
    }
}

#[cfg(test)]
mod tests {
    use mizu_result::ERR_SM_INVALID_NAME;

    use super::*;

    const OWNER: ThreadId = ThreadId::from_raw(300);

    #[test]
    fn test_name_validation() {
        let mut sm = ServiceManager::new();
        let empty = sm.register_service("", 4, None, OWNER).unwrap_err();
        assert_eq!(empty.to_result_code(), ERR_SM_INVALID_NAME);
        let long = sm.register_service("123456789", 4, None, OWNER).unwrap_err();
        assert_eq!(long.to_result_code(), ERR_SM_INVALID_NAME);
        assert!(sm.is_empty());
    }

    #[test]
    fn test_register_unregister_cycle() {
        let mut sm = ServiceManager::new();
        sm.register_service("apm", 4, None, OWNER).unwrap();
        let dup = sm.register_service("apm", 4, None, OWNER).unwrap_err();
        assert_eq!(dup.to_result_code(), ERR_SM_ALREADY_REGISTERED);

        let record = sm.unregister_service("apm").unwrap();
        assert_eq!(record.name, "apm");
        let gone = sm.unregister_service("apm").unwrap_err();
        assert_eq!(gone.to_result_code(), ERR_SM_NOT_REGISTERED);
    }

    #[test]
    fn test_get_service_returns_owner() {
        let mut sm = ServiceManager::new();
        sm.register_service("ns:am2", 8, None, OWNER).unwrap();
        let record = sm.get_service("ns:am2").unwrap();
        assert_eq!(record.owner, OWNER);
        assert_eq!(record.max_sessions, 8);
        assert!(matches!(
            sm.get_service("ns:am"),
            Err(GetServiceError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_unregister_owned_by() {
        let mut sm = ServiceManager::new();
        sm.register_service("apm", 4, None, OWNER).unwrap();
        sm.register_service("apm:p", 4, None, OWNER).unwrap();
        sm.register_service("vi:m", 4, None, ThreadId::from_raw(301)).unwrap();
        assert_eq!(sm.unregister_owned_by(OWNER), 2);
        assert_eq!(sm.names(), vec![ServiceName::new("vi:m").unwrap()]);
    }
}
