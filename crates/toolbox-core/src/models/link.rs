//! Pinned link collection

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Array field holding the links inside the remote `links` document.
pub const LINKS_FIELD: &str = "items";

/// An opaque pinned link payload. Equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkItem(Value);

impl LinkItem {
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Convenience constructor for the common `{url, title}` shape.
    pub fn url(url: impl Into<String>, title: Option<String>) -> Self {
        let mut map = Map::new();
        map.insert("url".to_string(), Value::String(url.into()));
        if let Some(title) = title {
            map.insert("title".to_string(), Value::String(title));
        }
        Self(Value::Object(map))
    }

    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for LinkItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Membership-keyed collection of links, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkCollection {
    items: Vec<LinkItem>,
}

impl LinkCollection {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn items(&self) -> &[LinkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &LinkItem) -> bool {
        self.items.contains(item)
    }

    /// Add an item unless an equal one is present. Returns whether it was added.
    pub fn add(&mut self, item: LinkItem) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove every item equal to `item`. Returns whether anything was removed.
    pub fn remove(&mut self, item: &LinkItem) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing != item);
        self.items.len() != before
    }

    /// Remove `old` then add `new`. Returns whether the collection changed.
    pub fn replace(&mut self, old: &LinkItem, new: LinkItem) -> bool {
        let removed = self.remove(old);
        let added = self.add(new);
        removed || added
    }

    /// Remote document payload: `{ "items": [...] }`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            LINKS_FIELD.to_string(),
            Value::Array(self.items.iter().map(|item| item.0.clone()).collect()),
        );
        map
    }

    /// Read a collection from a remote payload. `None` when the payload has
    /// no usable `items` array.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        let Value::Array(values) = payload.get(LINKS_FIELD)? else {
            return None;
        };
        let mut collection = Self::new();
        for value in values {
            collection.add(LinkItem(value.clone()));
        }
        Some(collection)
    }
}

impl FromIterator<LinkItem> for LinkCollection {
    fn from_iter<I: IntoIterator<Item = LinkItem>>(iter: I) -> Self {
        let mut collection = Self::new();
        for item in iter {
            collection.add(item);
        }
        collection
    }
}
