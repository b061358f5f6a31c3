//! Redis Cache 实现

use async_trait::async_trait;
use cuba_common::{RetryConfig, is_retryable_error, with_conditional_retry};
use cuba_errors::{AppError, AppResult};
use cuba_ports::CachePort;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::debug;

use crate::connection::check_connection;

/// 每次 SCAN 返回的建议数量，同时作为 DEL 批大小
const SCAN_BATCH_SIZE: usize = 100;

fn should_retry(err: &RedisError) -> bool {
    err.is_io_error() || err.is_timeout() || is_retryable_error(&err.to_string())
}

fn redis_error(op: &str, err: RedisError) -> AppError {
    AppError::external_service(format!("Redis {} failed: {}", op, err))
}

/// Redis Cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    retry: RetryConfig,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn scan_page(&self, cursor: u64, pattern: &str) -> AppResult<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH_SIZE)
            .query_async::<(u64, Vec<String>)>(&mut conn)
            .await
            .map_err(|e| redis_error("scan", e))
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        with_conditional_retry(
            &self.retry,
            "redis.get",
            || {
                let mut conn = self.conn.clone();
                async move { conn.get::<_, Option<String>>(key).await }
            },
            should_retry,
        )
        .await
        .map_err(|e| redis_error("get", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        with_conditional_retry(
            &self.retry,
            "redis.set",
            || {
                let mut conn = self.conn.clone();
                async move {
                    match ttl {
                        // SETEX 不接受 0 秒
                        Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await,
                        None => conn.set::<_, _, ()>(key, value).await,
                    }
                }
            },
            should_retry,
        )
        .await
        .map_err(|e| redis_error("set", e))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| redis_error("delete", e))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(key)
            .await
            .map_err(|e| redis_error("exists", e))
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut cursor = 0u64;
        let mut deleted = 0u64;

        loop {
            let (next, keys) = self.scan_page(cursor, pattern).await?;
            if !keys.is_empty() {
                let mut conn = self.conn.clone();
                let removed: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| redis_error("delete_pattern", e))?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, deleted, "Redis keys deleted by pattern");
        Ok(deleted)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        check_connection(&mut conn).await
    }
}
