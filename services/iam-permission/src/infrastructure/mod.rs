//! 基础设施层

pub mod audit;
pub mod cache;
pub mod metrics;
pub mod persistence;

pub use audit::AuditLogger;
pub use cache::{CheckStatistics, DecisionCache, DistributedPermissionCache, MemoryCache};
pub use metrics::{CheckMetrics, CheckTimer, DecisionSource};
pub use persistence::InMemoryPermissionRepository;
