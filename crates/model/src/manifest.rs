use crate::rules::ObjectRule;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Connection credentials for the remote source.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub instance_url: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"***")
            .field("instance_url", &self.instance_url)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A named lookup table referenced by `LIBRARY` field rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Library {
    Strings(Vec<String>),
    Numbers(Vec<f64>),
}

impl Library {
    pub fn len(&self) -> usize {
        match self {
            Library::Strings(v) => v.len(),
            Library::Numbers(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type Libraries = BTreeMap<String, Library>;

/// Input document of a job, written to the job directory at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    pub credentials: Credentials,
    #[serde(default)]
    pub libraries: Libraries,
    pub object_rules: BTreeMap<String, ObjectRule>,
}

impl JobManifest {
    pub fn object_names(&self) -> Vec<String> {
        self.object_rules.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_manifest_with_mixed_libraries() {
        let manifest: JobManifest = serde_json::from_value(json!({
            "credentials": {
                "accessToken": "token",
                "instanceUrl": "https://example.my.salesforce.com",
                "refreshToken": "refresh",
                "clientId": "client",
                "clientSecret": "secret"
            },
            "libraries": {
                "cities": ["Oslo", "Lima"],
                "scores": [1, 2.5]
            },
            "objectRules": {
                "Contact": { "type": "DELETE" },
                "Account": { "type": "MASKING", "fieldRules": { "Name": { "type": "BLANK" } } }
            }
        }))
        .unwrap();

        assert_eq!(manifest.object_names(), vec!["Account", "Contact"]);
        assert!(matches!(manifest.libraries["cities"], Library::Strings(_)));
        assert!(matches!(manifest.libraries["scores"], Library::Numbers(_)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials {
            access_token: "very-secret".into(),
            instance_url: "https://example.my.salesforce.com".into(),
            client_secret: Some("also-secret".into()),
            ..Default::default()
        };

        let printed = format!("{creds:?}");
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("also-secret"));
    }
}
