//! In-memory store test double.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::Store;

#[derive(Debug, Clone)]
enum Entry {
    Kv(String),
    Hash(BTreeMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
    ZSet(BTreeMap<String, f64>),
}

/// In-memory [`Store`] used by tests and local development.
///
/// Semantics match Redis closely enough for the queue and dedup paths:
/// missing keys read as empty, writes replace mismatched types.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_hash<R>(&self, key: &str, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()));
        if !matches!(entry, Entry::Hash(_)) {
            *entry = Entry::Hash(BTreeMap::new());
        }
        match entry {
            Entry::Hash(map) => f(map),
            _ => unreachable!(),
        }
    }

    fn with_set<R>(&self, key: &str, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        if !matches!(entry, Entry::Set(_)) {
            *entry = Entry::Set(HashSet::new());
        }
        match entry {
            Entry::Set(set) => f(set),
            _ => unreachable!(),
        }
    }

    fn with_list<R>(&self, key: &str, f: impl FnOnce(&mut VecDeque<String>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        if !matches!(entry, Entry::List(_)) {
            *entry = Entry::List(VecDeque::new());
        }
        match entry {
            Entry::List(list) => f(list),
            _ => unreachable!(),
        }
    }

    fn with_zset<R>(&self, key: &str, f: impl FnOnce(&mut BTreeMap<String, f64>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::ZSet(BTreeMap::new()));
        if !matches!(entry, Entry::ZSet(_)) {
            *entry = Entry::ZSet(BTreeMap::new());
        }
        match entry {
            Entry::ZSet(zset) => f(zset),
            _ => unreachable!(),
        }
    }

    fn sorted_members(zset: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> =
            zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        // Score order, member order as tiebreak (Redis lexicographic tiebreak).
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        members
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(match entries.get(key) {
            Some(Entry::Kv(v)) => Some(v.clone()),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), Entry::Kv(value.to_string()));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().contains_key(key))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.with_hash(key, |map| map.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.with_hash(key, |map| {
            map.insert(field.to_string(), value.to_string());
        });
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        self.with_hash(key, |map| {
            map.remove(field);
        });
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self.with_hash(key, |map| {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.with_set(key, |set| set.insert(member.to_string())))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.with_set(key, |set| {
            set.remove(member);
        });
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.with_set(key, |set| set.contains(member)))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        self.with_list(key, |list| list.push_back(value.to_string()));
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.with_list(key, |list| list.push_front(value.to_string()));
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_list(key, |list| list.pop_front()))
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        Ok(self.with_list(key, |list| list.len()))
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<()> {
        self.with_list(key, |list| list.retain(|v| v != value));
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.with_zset(key, |zset| {
            zset.insert(member.to_string(), score);
        });
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        self.with_zset(key, |zset| {
            zset.remove(member);
        });
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        Ok(self.with_zset(key, |zset| zset.len()))
    }

    async fn zrange_by_score(&self, key: &str, max: f64, limit: usize) -> Result<Vec<String>> {
        Ok(self.with_zset(key, |zset| {
            Self::sorted_members(zset)
                .into_iter()
                .filter(|(_, s)| *s <= max)
                .take(limit)
                .map(|(m, _)| m)
                .collect()
        }))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        Ok(self.with_zset(key, |zset| {
            let members = Self::sorted_members(zset);
            let len = members.len() as isize;
            let norm = |i: isize| -> isize {
                if i < 0 {
                    (len + i).max(0)
                } else {
                    i.min(len)
                }
            };
            let start = norm(start);
            let stop = norm(stop);
            if start > stop || len == 0 {
                return Vec::new();
            }
            members
                .into_iter()
                .skip(start as usize)
                .take((stop - start + 1) as usize)
                .map(|(m, _)| m)
                .collect()
        }))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self.with_zset(key, |zset| zset.get(member).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sadd_reports_new_membership() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "x").await.unwrap());
        assert!(!store.sadd("s", "x").await.unwrap());
        assert!(store.sismember("s", "x").await.unwrap());
    }

    #[tokio::test]
    async fn list_is_fifo_with_rpush_lpop() {
        let store = MemoryStore::new();
        store.rpush("q", "first").await.unwrap();
        store.rpush("q", "second").await.unwrap();
        store.lpush("q", "urgent").await.unwrap();
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("urgent"));
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("first"));
        assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.lpop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zrange_by_score_respects_max_and_limit() {
        let store = MemoryStore::new();
        store.zadd("z", "a", 1.0).await.unwrap();
        store.zadd("z", "b", 2.0).await.unwrap();
        store.zadd("z", "c", 3.0).await.unwrap();
        assert_eq!(
            store.zrange_by_score("z", 2.5, 10).await.unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(store.zrange_by_score("z", 10.0, 1).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn zrange_supports_negative_indices() {
        let store = MemoryStore::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            store.zadd("z", m, s).await.unwrap();
        }
        assert_eq!(store.zrange("z", 0, -1).await.unwrap().len(), 4);
        assert_eq!(store.zrange("z", 0, 1).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.zrange("z", -2, -1).await.unwrap(), vec!["c", "d"]);
    }
}
