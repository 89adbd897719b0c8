use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An attestation policy defined on the engine.
///
/// `parameters` is engine-specific and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub itemid: String,
    pub name: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub description: Option<String>,
}

/// A verification rule registered with the engine. Rules are identified by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_policy_parameters_are_opaque() {
        let policy: Policy = serde_json::from_value(json!({
            "itemid": "p1",
            "name": "tpm2 quote",
            "intent": "tpm2/quote",
            "parameters": {"pcrSelection": "sha256:0,1,2", "hashAlg": "sha256"}
        }))
        .unwrap();
        assert_eq!(policy.parameters["hashAlg"], "sha256");
        assert!(policy.description.is_none());
    }

    #[test]
    fn test_rule_identity_is_name() {
        let rule: Rule = serde_json::from_value(json!({
            "name": "tpm2_attestedValue",
            "description": "Checks the attested value"
        }))
        .unwrap();
        assert_eq!(rule.id(), "tpm2_attestedValue");
        assert!(rule.parameters.is_null());
    }
}
