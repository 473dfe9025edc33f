//! Parameter Resolver (§4.2): merges inline parameters with values pulled from referenced
//! secrets, redacts secret-sourced keys for status reporting, and computes a stable checksum.

use crate::util::{reasons, Error};
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use servicecatalog_types::ParametersFrom;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Result of resolving a spec's inline `parameters` plus its `parametersFrom` list.
pub struct ResolvedParameters {
    /// Merged parameters, unredacted, in canonical (`BTreeMap`) order. Sent to the broker.
    pub merged: serde_json::Value,
    /// Same shape with secret-sourced top-level keys replaced by `"<redacted>"`. Safe to persist
    /// to status.
    pub redacted: serde_json::Value,
    /// Hex SHA-256 digest of the canonicalized `merged` value.
    pub checksum: String,
}

/// Merges `inline` with the JSON values pulled from each `parameters_from` entry. A top-level key
/// present in both an inline parameter and any secret source -- or in two different secret
/// sources -- is a terminal parameter-preparation failure (§4.2).
pub async fn resolve(
    client: kube::Client,
    namespace: &str,
    inline: Option<&serde_json::Value>,
    parameters_from: &[ParametersFrom],
) -> Result<ResolvedParameters, Error> {
    let mut merged: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut secret_keys: std::collections::HashSet<String> = std::collections::HashSet::new();

    if let Some(inline) = inline {
        insert_object(&mut merged, inline, &mut None)?;
    }

    let api: Api<Secret> = Api::namespaced(client, namespace);
    for source in parameters_from {
        let secret = api.get(&source.secret_name).await.map_err(|e| match e {
            kube::Error::Api(ae) if ae.code == 404 => Error::terminal(
                reasons::instance::ERROR_WITH_PARAMETERS,
                format!("secret {} does not exist", source.secret_name),
            ),
            e => Error::from(e),
        })?;
        let data = secret.data.unwrap_or_default();
        let raw = data.get(&source.secret_key).ok_or_else(|| {
            Error::terminal(
                reasons::instance::ERROR_WITH_PARAMETERS,
                format!(
                    "secret {} has no key {}",
                    source.secret_name, source.secret_key
                ),
            )
        })?;
        let value: serde_json::Value = serde_json::from_slice(&raw.0).map_err(|_| {
            Error::terminal(
                reasons::instance::ERROR_WITH_PARAMETERS,
                format!(
                    "secret {}/{} is not valid JSON",
                    source.secret_name, source.secret_key
                ),
            )
        })?;
        insert_object(&mut merged, &value, &mut Some(&mut secret_keys))?;
    }

    let canonical = serde_json::to_value(&merged).expect("BTreeMap<String, Value> always serializes");
    let checksum = checksum_of(&canonical);

    let mut redacted = merged.clone();
    for key in &secret_keys {
        redacted.insert(key.clone(), serde_json::json!("<redacted>"));
    }

    Ok(ResolvedParameters {
        merged: canonical,
        redacted: serde_json::to_value(&redacted).expect("BTreeMap<String, Value> always serializes"),
        checksum,
    })
}

fn insert_object(
    merged: &mut BTreeMap<String, serde_json::Value>,
    value: &serde_json::Value,
    secret_keys: &mut Option<&mut std::collections::HashSet<String>>,
) -> Result<(), Error> {
    let object = value.as_object().ok_or_else(|| {
        Error::terminal(
            reasons::instance::ERROR_WITH_PARAMETERS,
            "parameters must be a JSON object".to_owned(),
        )
    })?;
    for (key, value) in object {
        if merged.contains_key(key) {
            return Err(Error::terminal(
                reasons::instance::ERROR_WITH_PARAMETERS,
                format!("key {} is set by more than one parameter source", key),
            ));
        }
        merged.insert(key.clone(), value.clone());
        if let Some(secret_keys) = secret_keys {
            secret_keys.insert(key.clone());
        }
    }
    Ok(())
}

/// Hex SHA-256 digest over the canonicalized (key-sorted) JSON serialization of `value`, so
/// semantically equal parameter sets always produce identical checksums (§4.2, §8 property 6).
pub fn checksum_of(value: &serde_json::Value) -> String {
    let canonical = to_canonical_string(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn to_canonical_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let ordered: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            serde_json::to_string(&ordered).expect("canonical map always serializes")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_across_key_order() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(checksum_of(&a), checksum_of(&b));
    }

    #[test]
    fn checksum_differs_on_value_change() {
        let a = serde_json::json!({"a": 1});
        let b = serde_json::json!({"a": 2});
        assert_ne!(checksum_of(&a), checksum_of(&b));
    }
}
