//! Identifier parsing and attribute access helpers

use std::collections::HashMap;

use rediscloud_core::provider::{ProviderError, ProviderResult};
use rediscloud_core::resource::Value;

pub type Attributes = HashMap<String, Value>;

/// Parse a subscription identifier (e.g., "1234")
pub fn parse_subscription_id(identifier: &str) -> ProviderResult<i64> {
    identifier.trim().parse().map_err(|_| {
        ProviderError::new(format!(
            "Invalid subscription id '{}': must be a number",
            identifier
        ))
    })
}

/// Build a peering identifier (e.g., "1234/56")
pub fn format_peering_id(subscription_id: i64, peering_id: i64) -> String {
    format!("{}/{}", subscription_id, peering_id)
}

/// Split a peering identifier into subscription and peering ids
pub fn parse_peering_id(identifier: &str) -> ProviderResult<(i64, i64)> {
    let invalid = || {
        ProviderError::new(format!(
            "Invalid peering id '{}': expected <subscription id>/<peering id>",
            identifier
        ))
    };

    let (subscription, peering) = identifier.split_once('/').ok_or_else(invalid)?;
    let subscription_id = subscription.parse().map_err(|_| invalid())?;
    let peering_id = peering.parse().map_err(|_| invalid())?;
    Ok((subscription_id, peering_id))
}

pub fn optional_str<'a>(attrs: &'a Attributes, key: &str) -> ProviderResult<Option<&'a str>> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ProviderError::new(format!("`{}` must be a string", key))),
    }
}

pub fn required_str<'a>(attrs: &'a Attributes, key: &str) -> ProviderResult<&'a str> {
    optional_str(attrs, key)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::new(format!("`{}` must be set", key)))
}

pub fn optional_int(attrs: &Attributes, key: &str) -> ProviderResult<Option<i64>> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_int()
            .map(Some)
            .ok_or_else(|| ProviderError::new(format!("`{}` must be a number", key))),
    }
}

pub fn required_int(attrs: &Attributes, key: &str) -> ProviderResult<i64> {
    optional_int(attrs, key)?.ok_or_else(|| ProviderError::new(format!("`{}` must be set", key)))
}

pub fn required_float(attrs: &Attributes, key: &str) -> ProviderResult<f64> {
    attrs
        .get(key)
        .ok_or_else(|| ProviderError::new(format!("`{}` must be set", key)))?
        .as_float()
        .ok_or_else(|| ProviderError::new(format!("`{}` must be a number", key)))
}

pub fn required_bool(attrs: &Attributes, key: &str) -> ProviderResult<bool> {
    attrs
        .get(key)
        .ok_or_else(|| ProviderError::new(format!("`{}` must be set", key)))?
        .as_bool()
        .ok_or_else(|| ProviderError::new(format!("`{}` must be a boolean", key)))
}

/// Insert a string attribute when present
pub fn set_optional(attrs: &mut Attributes, key: &str, value: Option<String>) {
    if let Some(value) = value {
        attrs.insert(key.to_string(), Value::String(value));
    }
}
