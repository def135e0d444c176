use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored provider credential. The engine resolves LLM credentials by
/// `credential_type` (e.g. `"anthropic"`) when no environment key is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    /// Provider-specific secret material, e.g. `{"apiKey": "..."}`.
    #[serde(default)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(name: impl Into<String>, credential_type: impl Into<String>, data: Value) -> Self {
        Credential {
            id: super::new_id(),
            name: name.into(),
            credential_type: credential_type.into(),
            data,
            created_at: Utc::now(),
        }
    }

    /// Copy with secret material blanked, for list responses.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        c.data = Value::Null;
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_field_rename() {
        let c = Credential::new("main", "anthropic", json!({"apiKey": "sk-x"}));
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], json!("anthropic"));
    }

    #[test]
    fn test_redacted_drops_data() {
        let c = Credential::new("main", "anthropic", json!({"apiKey": "sk-x"}));
        assert!(c.redacted().data.is_null());
        assert_eq!(c.redacted().name, "main");
    }
}
