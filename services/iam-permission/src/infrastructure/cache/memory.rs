//! 基于 moka 的内存 `CachePort`
//!
//! 单节点部署或测试时代替 Redis。每个条目可以有自己的 TTL。

use std::time::Duration;

use async_trait::async_trait;
use cuba_errors::AppResult;
use cuba_ports::CachePort;
use moka::future::Cache as MokaCache;
use tokio::time::Instant;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Clone)]
pub struct MemoryCache {
    inner: MokaCache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: MokaCache::builder().max_capacity(max_capacity).build(),
        }
    }
}

/// `*` 匹配任意长度字符
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        match self.inner.get(key).await {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value)),
            Some(_) => {
                self.inner.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let keys: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &keys {
            self.inner.invalidate(key).await;
        }
        Ok(keys.len() as u64)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("perm:*", "perm:user_roles:u1:t1"));
        assert!(glob_match("perm:check_result:perm_check:u1:t1:*", "perm:check_result:perm_check:u1:t1:doc:read"));
        assert!(!glob_match("perm:check_result:perm_check:u1:t1:*", "perm:check_result:perm_check:u10:t1:doc:read"));
        assert!(glob_match("a*c*e", "abcde"));
        assert!(!glob_match("a*c*e", "abde"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_ttl() {
        let cache = MemoryCache::new(100);
        cache.set("a", "1", Some(Duration::from_secs(5))).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_pattern_counts() {
        let cache = MemoryCache::new(100);
        cache.set("perm:a", "1", None).await.unwrap();
        cache.set("perm:b", "1", None).await.unwrap();
        cache.set("other", "1", None).await.unwrap();

        assert_eq!(cache.delete_pattern("perm:*").await.unwrap(), 2);
        assert!(!cache.exists("perm:a").await.unwrap());
        assert!(cache.exists("other").await.unwrap());
    }
}
