//! 进程内决策缓存
//!
//! 缓存条目与检查统计共用一把读写锁。过期条目在下次查询该键时惰性删除，
//! 也可以通过 `purge_expired` 主动清理。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

use crate::domain::PermissionCheckResponse;

/// 检查统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckStatistics {
    pub total_checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub resolution_errors: u64,
    pub policy_evaluations: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: PermissionCheckResponse,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    stats: CheckStatistics,
}

/// 决策缓存
#[derive(Debug, Default)]
pub struct DecisionCache {
    state: RwLock<State>,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取未过期的缓存，并记录命中或未命中
    pub fn get(&self, key: &str) -> Option<PermissionCheckResponse> {
        let now = Instant::now();
        let lookup = {
            let state = self.state.read();
            state
                .entries
                .get(key)
                .map(|entry| (entry.expires_at > now).then(|| entry.response.clone()))
        };

        let mut state = self.state.write();
        match lookup {
            Some(Some(response)) => {
                state.stats.cache_hits += 1;
                Some(response)
            }
            Some(None) => {
                // 写锁下重新确认，避免删掉并发写入的新条目
                if state.entries.get(key).is_some_and(|e| e.expires_at <= now) {
                    state.entries.remove(key);
                }
                state.stats.cache_misses += 1;
                None
            }
            None => {
                state.stats.cache_misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, response: PermissionCheckResponse, ttl: Duration) {
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + ttl,
        };
        self.state.write().entries.insert(key.into(), entry);
    }

    /// 删除以 `prefix` 开头的全部条目，返回删除数量
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        before - state.entries.len()
    }

    pub fn clear(&self) {
        self.state.write().entries.clear();
    }

    /// 清理所有已过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.expires_at > now);
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 记录一次完成的检查
    pub fn record_decision(&self, allowed: bool) {
        let mut state = self.state.write();
        state.stats.total_checks += 1;
        if allowed {
            state.stats.allowed += 1;
        } else {
            state.stats.denied += 1;
        }
    }

    pub fn record_resolution_error(&self) {
        self.state.write().stats.resolution_errors += 1;
    }

    pub fn record_policy_evaluation(&self) {
        self.state.write().stats.policy_evaluations += 1;
    }

    pub fn statistics(&self) -> CheckStatistics {
        self.state.read().stats
    }

    pub fn reset_statistics(&self) {
        self.state.write().stats = CheckStatistics::default();
    }
}
