//! 缓存模块
//!
//! - DecisionCache: 进程内决策缓存与检查统计
//! - DistributedPermissionCache: 基于 `CachePort` 的 `PermissionCache` 实现
//! - MemoryCache: moka 内存 `CachePort`

pub mod decision_cache;
pub mod distributed;
pub mod memory;

pub use decision_cache::{CheckStatistics, DecisionCache};
pub use distributed::DistributedPermissionCache;
pub use memory::MemoryCache;
