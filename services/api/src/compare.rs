//! Product compare list and spec differences

use common::cache::CacheStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, time::Duration};
use tracing::warn;
use uuid::Uuid;

pub const MAX_COMPARE_ITEMS: usize = 4;
const COMPARE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    Full,
}

/// Up to four distinct product ids in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompareList {
    items: Vec<Uuid>,
}

impl CompareList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the first four distinct ids
    pub fn from_ids<I: IntoIterator<Item = Uuid>>(ids: I) -> Self {
        let mut list = Self::new();
        for id in ids {
            if list.add(id) == AddOutcome::Full {
                break;
            }
        }
        list
    }

    pub fn add(&mut self, id: Uuid) -> AddOutcome {
        if self.contains(id) {
            AddOutcome::AlreadyPresent
        } else if self.is_full() {
            AddOutcome::Full
        } else {
            self.items.push(id);
            AddOutcome::Added
        }
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| *item != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_COMPARE_ITEMS
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.items
    }

    pub fn to_json(&self) -> String {
        Value::from(
            self.items
                .iter()
                .map(|id| Value::String(id.to_string()))
                .collect::<Vec<_>>(),
        )
        .to_string()
    }

    /// Decode a stored list; junk entries are skipped and the result is capped at four
    pub fn from_json(raw: &str) -> Self {
        let ids = match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(values) => values,
            Err(e) => {
                warn!("Discarding unreadable compare list: {}", e);
                return Self::new();
            }
        };

        Self::from_ids(
            ids.iter()
                .filter_map(Value::as_str)
                .filter_map(|s| s.parse::<Uuid>().ok()),
        )
    }
}

fn cache_key(user_id: Uuid) -> String {
    format!("compare:{}", user_id)
}

pub async fn load(cache: &CacheStore, user_id: Uuid) -> CompareList {
    cache
        .get_json::<String>(&cache_key(user_id))
        .await
        .map(|raw| CompareList::from_json(&raw))
        .unwrap_or_default()
}

pub async fn save(cache: &CacheStore, user_id: Uuid, list: &CompareList) {
    if list.is_empty() {
        cache.delete(&cache_key(user_id)).await;
    } else {
        cache
            .set_json(&cache_key(user_id), &list.to_json(), COMPARE_TTL)
            .await;
    }
}

/// For each spec key, whether the products disagree on it.
///
/// A key differs when two products hold different values or when some products lack it.
/// Fewer than two products never differ.
pub fn detect_spec_differences(specs: &[&Map<String, Value>]) -> BTreeMap<String, bool> {
    let mut differences = BTreeMap::new();
    if specs.len() < 2 {
        return differences;
    }

    for key in specs.iter().flat_map(|s| s.keys()) {
        if differences.contains_key(key) {
            continue;
        }
        let values: Vec<Option<&Value>> = specs.iter().map(|s| s.get(key)).collect();
        let first = values[0];
        let differs = values.iter().any(|v| *v != first);
        differences.insert(key.clone(), differs);
    }

    differences
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecRow {
    pub key: String,
    pub values: Vec<Option<Value>>,
    pub is_different: bool,
}

/// Table rows for the compare page, differing keys first then alphabetical
pub fn spec_rows(specs: &[&Map<String, Value>]) -> Vec<SpecRow> {
    let differences = detect_spec_differences(specs);
    let mut rows: Vec<SpecRow> = specs
        .iter()
        .flat_map(|s| s.keys())
        .fold(Vec::<String>::new(), |mut keys, key| {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
            keys
        })
        .into_iter()
        .map(|key| SpecRow {
            values: specs.iter().map(|s| s.get(&key).cloned()).collect(),
            is_different: differences.get(&key).copied().unwrap_or(false),
            key,
        })
        .collect();

    rows.sort_by(|a, b| b.is_different.cmp(&a.is_different).then_with(|| a.key.cmp(&b.key)));
    rows
}
