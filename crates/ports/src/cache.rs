//! Cache trait 定义

use async_trait::async_trait;
use cuba_errors::AppResult;
use std::time::Duration;

/// 键值缓存 trait
///
/// 值一律为字符串，序列化由调用方负责。
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值，`ttl` 为 None 时不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// 删除缓存
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 按通配模式删除（`*` 匹配任意字符），返回删除数量
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// 连通性检查
    async fn ping(&self) -> AppResult<()>;
}
