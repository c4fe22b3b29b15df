//! Typed identity claims attached to an authenticated session.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity claims of a signed-in user.
///
/// Claims arrive as loosely typed JSON (an identity-provider payload or a
/// configuration table). [`SessionClaims::decode`] is the only way in and
/// checks each field on its own, so a bad payload names the offending field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionClaims {
    /// Stable subject identifier (`sub`).
    #[serde(rename = "sub")]
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl SessionClaims {
    /// Decode and validate a claims payload.
    pub fn decode(payload: &Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::claims("claims", "expected a JSON object"))?;

        let subject = required_str(object, "sub")?;
        let email = required_str(object, "email")?;
        if !email.contains('@') {
            return Err(Error::claims("email", "not an email address"));
        }

        let email_verified = match object.get("email_verified") {
            Some(Value::Bool(verified)) => *verified,
            Some(_) => return Err(Error::claims("email_verified", "expected a boolean")),
            None => return Err(Error::claims("email_verified", "missing")),
        };

        let given_name = optional_str(object, "given_name")?;
        let family_name = optional_str(object, "family_name")?;
        let name = match optional_str(object, "name")? {
            Some(name) => name,
            None => match (&given_name, &family_name) {
                (Some(given), Some(family)) => format!("{given} {family}"),
                (Some(given), None) => given.clone(),
                _ => return Err(Error::claims("name", "missing")),
            },
        };

        Ok(Self {
            subject,
            email,
            email_verified,
            name,
            given_name,
            family_name,
            picture: optional_str(object, "picture")?,
        })
    }
}

impl<'de> Deserialize<'de> for SessionClaims {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let payload = Value::deserialize(deserializer)?;
        Self::decode(&payload).map_err(serde::de::Error::custom)
    }
}

fn required_str(object: &Map<String, Value>, field: &'static str) -> Result<String> {
    match object.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(Error::claims(field, "must not be empty")),
        Some(_) => Err(Error::claims(field, "expected a string")),
        None => Err(Error::claims(field, "missing")),
    }
}

fn optional_str(object: &Map<String, Value>, field: &'static str) -> Result<Option<String>> {
    match object.get(field) {
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(Error::claims(field, "expected a string")),
    }
}
