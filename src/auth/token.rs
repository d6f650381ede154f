use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair delivered by the auth popup.
///
/// The popup posts `{"jwt": "...", "refresh_token": "..."}`; any other fields
/// the endpoint adds are kept in `extra` untouched.
///
/// # Example
/// ```
/// use popauth::auth::Credential;
///
/// let credential = Credential::from_payload(&serde_json::json!({
///     "jwt": "header.claims.sig",
///     "refresh_token": "rt-1",
/// }))
/// .unwrap();
/// assert_eq!(credential.access_token, "header.claims.sig");
/// assert_eq!(credential.refresh_token, "rt-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "jwt")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            received_at: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    /// Interpret a message payload as a credential.
    ///
    /// Returns `None` for anything that is not an object with a non-empty
    /// string `jwt` field. Past that check nothing else is validated: the
    /// refresh token is taken from `refresh_token` (or `refreshToken`) when it
    /// is a string and left empty otherwise.
    pub fn from_payload(data: &serde_json::Value) -> Option<Self> {
        let object = data.as_object()?;
        let access_token = object
            .get(ACCESS_FIELD)
            .filter(|value| is_truthy(value))?
            .as_str()?
            .to_string();
        let refresh_token = REFRESH_FIELDS
            .iter()
            .find_map(|field| object.get(*field).and_then(|value| value.as_str()))
            .unwrap_or_default()
            .to_string();
        let extra = object
            .iter()
            .filter(|(key, _)| {
                key.as_str() != ACCESS_FIELD && !REFRESH_FIELDS.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Self {
            access_token,
            refresh_token,
            received_at: Utc::now(),
            extra,
        })
    }
}

pub(crate) const ACCESS_FIELD: &str = "jwt";
const REFRESH_FIELDS: [&str; 2] = ["refresh_token", "refreshToken"];

/// Truthiness as the popup page's script sees it.
pub(crate) fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_with_jwt_becomes_credential() {
        let credential = Credential::from_payload(&json!({
            "jwt": "a",
            "refresh_token": "b",
            "nonce": "n-1"
        }))
        .unwrap();
        assert_eq!(credential.access_token, "a");
        assert_eq!(credential.refresh_token, "b");
        assert_eq!(credential.extra.get("nonce"), Some(&json!("n-1")));
    }

    #[test]
    fn missing_refresh_token_defaults_to_empty() {
        let credential = Credential::from_payload(&json!({ "jwt": "a" })).unwrap();
        assert_eq!(credential.refresh_token, "");
    }

    #[test]
    fn falsy_or_malformed_payloads_are_ignored() {
        assert!(Credential::from_payload(&json!({ "jwt": "" })).is_none());
        assert!(Credential::from_payload(&json!({ "jwt": null })).is_none());
        assert!(Credential::from_payload(&json!({ "jwt": 7 })).is_none());
        assert!(Credential::from_payload(&json!({ "type": "ready" })).is_none());
        assert!(Credential::from_payload(&json!("jwt")).is_none());
    }

    #[test]
    fn odd_refresh_fields_do_not_block_the_credential() {
        let null_refresh =
            Credential::from_payload(&json!({ "jwt": "a", "refresh_token": null })).unwrap();
        assert_eq!(null_refresh.refresh_token, "");

        let numeric = Credential::from_payload(&json!({ "jwt": "a", "refresh_token": 5 })).unwrap();
        assert_eq!(numeric.refresh_token, "");

        let both = Credential::from_payload(&json!({
            "jwt": "a",
            "refresh_token": "snake",
            "refreshToken": "camel"
        }))
        .unwrap();
        assert_eq!(both.refresh_token, "snake");
        assert!(both.extra.is_empty());

        let camel = Credential::from_payload(&json!({ "jwt": "a", "refreshToken": "camel" })).unwrap();
        assert_eq!(camel.refresh_token, "camel");
    }
}
