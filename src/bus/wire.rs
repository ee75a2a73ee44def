//! Wire types and conversions shared by the interface objects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Type, Value};

use super::error::{invalid_args, BusError};
use crate::attributes::Attributes;
use crate::session::Secret;

pub(crate) const COLLECTION_LABEL: &str = "org.freedesktop.Secret.Collection.Label";
pub(crate) const ITEM_LABEL: &str = "org.freedesktop.Secret.Item.Label";
pub(crate) const ITEM_ATTRIBUTES: &str = "org.freedesktop.Secret.Item.Attributes";

/// `(oayays)`: session, parameters, value, content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct WireSecret {
    pub session: OwnedObjectPath,
    pub parameters: Vec<u8>,
    pub value: Vec<u8>,
    pub content_type: String,
}

impl TryFrom<Secret> for WireSecret {
    type Error = BusError;

    fn try_from(secret: Secret) -> Result<Self, BusError> {
        Ok(Self {
            session: object_path(&secret.session)?,
            parameters: secret.parameters,
            value: secret.value,
            content_type: secret.content_type,
        })
    }
}

impl From<WireSecret> for Secret {
    fn from(secret: WireSecret) -> Self {
        Self {
            session: secret.session.as_str().to_string(),
            parameters: secret.parameters,
            value: secret.value,
            content_type: secret.content_type,
        }
    }
}

pub(crate) fn object_path(path: &str) -> Result<OwnedObjectPath, BusError> {
    OwnedObjectPath::try_from(path.to_string()).map_err(|err| BusError::ZBus(err.into()))
}

pub(crate) fn object_paths(paths: &[String]) -> Result<Vec<OwnedObjectPath>, BusError> {
    paths.iter().map(|path| object_path(path)).collect()
}

pub(crate) fn path_strings(paths: &[OwnedObjectPath]) -> Vec<String> {
    paths.iter().map(|path| path.as_str().to_string()).collect()
}

/// The string stored under `key`, if it is one.
pub(crate) fn string_property(properties: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    match properties.get(key).map(|value| &**value) {
        Some(Value::Str(s)) => Some(s.as_str().to_string()),
        _ => None,
    }
}

/// The `a{ss}` dictionary stored under `key`; absent means empty.
pub(crate) fn attributes_property(
    properties: &HashMap<String, OwnedValue>,
    key: &str,
) -> Result<Attributes, BusError> {
    let Some(value) = properties.get(key) else {
        return Ok(Attributes::new());
    };
    let value: Value<'static> = value.try_clone().map_err(invalid_args)?.into();
    HashMap::<String, String>::try_from(value).map_err(invalid_args)
}

/// Bytes of an `OpenSession` input: an `ay` for DH, ignored otherwise.
pub(crate) fn input_bytes(input: OwnedValue) -> Result<Vec<u8>, BusError> {
    match Value::from(input) {
        Value::Str(_) => Ok(Vec::new()),
        value => Vec::<u8>::try_from(value).map_err(invalid_args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_signature() {
        assert_eq!(WireSecret::SIGNATURE.to_string(), "(oayays)");
    }

    #[test]
    fn test_secret_conversion_keeps_fields() {
        let secret = Secret {
            session: "/org/freedesktop/secrets/session/3".into(),
            parameters: vec![1; 16],
            value: vec![2; 32],
            content_type: "text/plain".into(),
        };
        let wire = WireSecret::try_from(secret.clone()).unwrap();
        assert_eq!(wire.session.as_str(), "/org/freedesktop/secrets/session/3");
        assert_eq!(Secret::from(wire), secret);
    }
}
