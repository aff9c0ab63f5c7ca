//! Bounded, ordered views over a store node's children.
//!
//! A [`Query`] is what a paginated subscription is scoped to: "the last N
//! messages ordered by timestamp", "the first N chats". Two queries that
//! compare equal select the same children, which is what lets a detached
//! stream be re-attached to an equivalent subscription.

use std::cmp::Ordering;

use serde_json::Value;

use crate::path::StorePath;

/// Ordering of a node's children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// By child key.
    #[default]
    Key,
    /// By the value of a field inside each child, then by key.
    Child(String),
}

/// Window bound of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// First `n` children in order.
    First(usize),
    /// Last `n` children in order.
    Last(usize),
}

impl Limit {
    /// Number of children the limit admits.
    pub fn size(self) -> usize {
        match self {
            Self::First(n) | Self::Last(n) => n,
        }
    }
}

/// Query over the children of one store node.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Node whose children are selected.
    pub path: StorePath,
    /// Child ordering.
    pub order: OrderBy,
    /// Window bound. `None` selects every child.
    pub limit: Option<Limit>,
    /// Keep only children whose ordering value equals this.
    pub equal_to: Option<Value>,
}

impl Query {
    /// Every child of `path`, in key order.
    pub fn at(path: StorePath) -> Self {
        Self { path, order: OrderBy::Key, limit: None, equal_to: None }
    }

    /// Order children by `field`.
    #[must_use]
    pub fn order_by_child(mut self, field: impl Into<String>) -> Self {
        self.order = OrderBy::Child(field.into());
        self
    }

    /// Keep the first `n` children.
    #[must_use]
    pub fn limit_to_first(mut self, n: usize) -> Self {
        self.limit = Some(Limit::First(n));
        self
    }

    /// Keep the last `n` children.
    #[must_use]
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(Limit::Last(n));
        self
    }

    /// Keep children whose ordering value equals `value`.
    #[must_use]
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    /// Window size. `None` if unbounded.
    pub fn window(&self) -> Option<usize> {
        self.limit.map(Limit::size)
    }

    /// Select, order, and bound `children` the way the store does.
    pub fn select<'a, I>(&self, children: I) -> Vec<(&'a str, &'a Value)>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut selected: Vec<(&str, &Value)> = children
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .filter(|(k, v)| {
                self.equal_to
                    .as_ref()
                    .is_none_or(|target| self.order_value(k, v).as_ref() == Some(target))
            })
            .map(|(k, v)| (k.as_str(), v))
            .collect();

        selected.sort_by(|(ka, va), (kb, vb)| match &self.order {
            OrderBy::Key => ka.cmp(kb),
            OrderBy::Child(field) => {
                compare_values(va.get(field.as_str()), vb.get(field.as_str())).then(ka.cmp(kb))
            },
        });

        match self.limit {
            None => selected,
            Some(Limit::First(n)) => {
                selected.truncate(n);
                selected
            },
            Some(Limit::Last(n)) => {
                let skip = selected.len().saturating_sub(n);
                selected.split_off(skip)
            },
        }
    }

    fn order_value(&self, key: &str, value: &Value) -> Option<Value> {
        match &self.order {
            OrderBy::Key => Some(Value::String(key.to_owned())),
            OrderBy::Child(field) => value.get(field.as_str()).cloned(),
        }
    }
}

/// Store ordering of child values: missing, booleans, numbers, strings,
/// then objects.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_) | Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn messages() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("m1".to_owned(), json!({ "text": "a", "timestamp": 300 })),
            ("m2".to_owned(), json!({ "text": "b", "timestamp": 100 })),
            ("m3".to_owned(), json!({ "text": "c", "timestamp": 200 })),
        ])
    }

    fn keys(selected: &[(&str, &Value)]) -> Vec<String> {
        selected.iter().map(|(k, _)| (*k).to_owned()).collect()
    }

    #[test]
    fn last_n_by_timestamp() {
        let children = messages();
        let query =
            Query::at(StorePath::parse("messages/c1")).order_by_child("timestamp").limit_to_last(2);
        assert_eq!(keys(&query.select(&children)), ["m3", "m1"]);
        assert_eq!(query.window(), Some(2));
    }

    #[test]
    fn first_n_by_key() {
        let children = messages();
        let query = Query::at(StorePath::parse("messages/c1")).limit_to_first(2);
        assert_eq!(keys(&query.select(&children)), ["m1", "m2"]);
    }

    #[test]
    fn equal_to_filters_on_ordering_field() {
        let children = BTreeMap::from([
            ("c1".to_owned(), json!({ "title": "Reading" })),
            ("c2".to_owned(), json!({ "title": "Breathing" })),
        ]);
        let query = Query::at(StorePath::parse("public_chats")).order_by_child("title").equal_to("Reading");
        assert_eq!(keys(&query.select(&children)), ["c1"]);
    }

    #[test]
    fn limit_larger_than_children_keeps_all() {
        let children = messages();
        let query = Query::at(StorePath::root()).order_by_child("timestamp").limit_to_last(10);
        assert_eq!(query.select(&children).len(), 3);
    }

    #[test]
    fn missing_field_sorts_first() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(true)), Some(&json!(0))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
    }
}
