//! Search attributes for vault items.
//!
//! Secret Service clients find items by string attributes (libsecret
//! schemas). Vault items have no attributes of their own, so a mapper
//! derives them from the item's fields, and writes them back when a client
//! creates or edits an item.

use std::collections::HashMap;

use crate::vault::{ItemRequest, LoginUri, VaultItem};

pub type Attributes = HashMap<String, String>;

/// Attribute naming the libsecret schema. Not stored and never used to
/// filter: vault items match whatever schema a client asks for.
pub const SCHEMA_ATTRIBUTE: &str = "xdg:schema";

pub const GENERIC_SCHEMA: &str = "org.freedesktop.Secret.Generic";

pub trait AttributeMapper: Send + Sync {
    /// The attributes an item exposes.
    fn attributes(&self, item: &VaultItem) -> Attributes;

    /// A term to narrow the vault query, if `query` carries one.
    fn search_term(&self, query: &Attributes) -> Option<String>;

    /// Write `attributes` into the fields of `request`.
    fn apply(&self, request: &mut ItemRequest, attributes: &Attributes);

    /// True if `item` carries every queried attribute with the same value.
    fn matches(&self, item: &VaultItem, query: &Attributes) -> bool {
        let exposed = self.attributes(item);
        query
            .iter()
            .filter(|(key, _)| key.as_str() != SCHEMA_ATTRIBUTE)
            .all(|(key, value)| exposed.get(key) == Some(value))
    }
}

/// Maps login items: `service` is the item name, `username` the login user,
/// `url` and `uri` the first login URI. The URI doubles as the vault search
/// term.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoginAttributeMapper;

const SERVICE: &str = "service";
const USERNAME: &str = "username";
const URL_KEYS: [&str; 2] = ["url", "uri"];

impl AttributeMapper for LoginAttributeMapper {
    fn attributes(&self, item: &VaultItem) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(SCHEMA_ATTRIBUTE.into(), GENERIC_SCHEMA.into());
        attributes.insert(SERVICE.into(), item.name.clone());
        if let Some(username) = item.username() {
            attributes.insert(USERNAME.into(), username.to_string());
        }
        if let Some(uri) = item.uri() {
            for key in URL_KEYS {
                attributes.insert(key.into(), uri.to_string());
            }
        }
        attributes
    }

    fn search_term(&self, query: &Attributes) -> Option<String> {
        URL_KEYS
            .iter()
            .find_map(|key| query.get(*key))
            .filter(|uri| !uri.is_empty())
            .cloned()
    }

    fn apply(&self, request: &mut ItemRequest, attributes: &Attributes) {
        if let Some(service) = attributes.get(SERVICE) {
            if request.name.is_empty() {
                request.name = service.clone();
            }
        }
        if let Some(username) = attributes.get(USERNAME) {
            request.login.username = Some(username.clone());
        }
        if let Some(uri) = URL_KEYS.iter().find_map(|key| attributes.get(*key)) {
            request.login.uris = vec![LoginUri { uri: uri.clone() }];
        }
    }
}
