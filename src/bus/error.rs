//! Bus-facing errors.
//!
//! Method handlers return `BusError`, built from `ServiceError` through
//! `to_protocol_error`, so backend detail never reaches a caller. Errors of
//! the Secret Service namespace are variants here; the generic D-Bus ones
//! travel through the wrapped `zbus::Error`.

use zbus::{fdo, DBusError};

use crate::error::{to_protocol_error, ProtocolError, ServiceError};

#[derive(Debug, DBusError)]
#[zbus(prefix = "org.freedesktop.Secret.Error")]
pub enum BusError {
    #[zbus(error)]
    ZBus(zbus::Error),
    IsLocked(String),
    NoSession(String),
    NoSuchObject(String),
    PromptDismissed(String),
}

impl From<ProtocolError> for BusError {
    fn from(err: ProtocolError) -> Self {
        let message = err.to_string();
        match err {
            ProtocolError::IsLocked => Self::IsLocked(message),
            ProtocolError::PromptDismissed => Self::PromptDismissed(message),
            ProtocolError::NoSession(_) => Self::NoSession(message),
            ProtocolError::NoSuchObject(_) => Self::NoSuchObject(message),
            ProtocolError::InvalidArgs(_) => Self::ZBus(fdo::Error::InvalidArgs(message).into()),
            ProtocolError::NotSupported(_) => {
                Self::ZBus(fdo::Error::NotSupported(message).into())
            }
            ProtocolError::Failed => Self::ZBus(fdo::Error::Failed(message).into()),
        }
    }
}

impl From<ServiceError> for BusError {
    fn from(err: ServiceError) -> Self {
        to_protocol_error(&err).into()
    }
}

/// Property accessors can only fail with `fdo::Error`.
pub(crate) fn property_error(err: ServiceError) -> fdo::Error {
    let protocol = to_protocol_error(&err);
    let message = protocol.to_string();
    match protocol {
        ProtocolError::NoSuchObject(_) => fdo::Error::UnknownObject(message),
        ProtocolError::InvalidArgs(_) => fdo::Error::InvalidArgs(message),
        ProtocolError::NotSupported(_) => fdo::Error::NotSupported(message),
        _ => fdo::Error::Failed(message),
    }
}

/// A malformed argument that zvariant could not convert.
pub(crate) fn invalid_args(err: impl std::fmt::Display) -> BusError {
    BusError::ZBus(fdo::Error::InvalidArgs(err.to_string()).into())
}
