//! Store snapshots.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

/// Value of one store node at the time of a notification or read.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: String,
    value: Option<Value>,
}

impl Snapshot {
    /// Create a snapshot. A JSON `null` is normalised to "does not exist".
    pub fn new(key: impl Into<String>, value: Option<Value>) -> Self {
        let value = value.filter(|v| !v.is_null());
        Self { key: key.into(), value }
    }

    /// Snapshot of a node that does not exist.
    pub fn missing(key: impl Into<String>) -> Self {
        Self { key: key.into(), value: None }
    }

    /// Last segment of the node's path.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw value. `None` if the node does not exist.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Check if the node exists.
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Decode the value. `Ok(None)` if the node does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the value has the wrong shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.value
            .as_ref()
            .map(|v| {
                T::deserialize(v).map_err(|e| StoreError::Decode {
                    key: self.key.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Child snapshots of an object value, in key order.
    pub fn children(&self) -> Vec<Snapshot> {
        match &self.value {
            Some(Value::Object(map)) => {
                let mut children: Vec<_> =
                    map.iter().map(|(k, v)| Snapshot::new(k.clone(), Some(v.clone()))).collect();
                children.sort_by(|a, b| a.key.cmp(&b.key));
                children
            },
            _ => Vec::new(),
        }
    }

    /// Consume the snapshot, returning its value.
    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_means_missing() {
        let snapshot = Snapshot::new("name", Some(Value::Null));
        assert!(!snapshot.exists());
        assert_eq!(snapshot.decode::<String>().unwrap(), None);
    }

    #[test]
    fn decode_reports_key_on_shape_mismatch() {
        let snapshot = Snapshot::new("count", Some(json!("three")));
        let err = snapshot.decode::<u64>().unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "count"));
    }

    #[test]
    fn children_are_key_ordered() {
        let snapshot = Snapshot::new("members", Some(json!({ "u2": true, "u1": true })));
        let keys: Vec<_> = snapshot.children().iter().map(|c| c.key().to_owned()).collect();
        assert_eq!(keys, ["u1", "u2"]);
    }
}
