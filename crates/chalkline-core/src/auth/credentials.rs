use serde::{Deserialize, Serialize};

/// The access/refresh bearer pair issued to one logged-in device.
///
/// The pair is atomic: a refresh replaces both fields together, never one
/// at a time. Both values are opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_credential: String,
    pub refresh_credential: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access_credential: access.into(),
            refresh_credential: refresh.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_payload() {
        let pair: CredentialPair = serde_json::from_value(serde_json::json!({
            "accessCredential": "acc-1",
            "refreshCredential": "ref-1",
        }))
        .unwrap();
        assert_eq!(pair.access_credential, "acc-1");
        assert_eq!(pair.refresh_credential, "ref-1");
    }
}
