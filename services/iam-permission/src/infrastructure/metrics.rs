//! 权限检查指标

use metrics::{counter, histogram};
use tokio::time::Instant;

/// 决策来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Cache,
    Permission,
    Policy,
    DefaultDeny,
    Invalid,
    Error,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::Cache => "cache",
            DecisionSource::Permission => "permission",
            DecisionSource::Policy => "policy",
            DecisionSource::DefaultDeny => "default_deny",
            DecisionSource::Invalid => "invalid",
            DecisionSource::Error => "error",
        }
    }
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 权限检查监控工具
pub struct CheckMetrics;

impl CheckMetrics {
    pub fn record_check(start: Instant, allowed: bool, source: DecisionSource) {
        histogram!("permission_check_duration_ms", "source" => source.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        counter!(
            "permission_checks_total",
            "allowed" => allowed.to_string(),
            "source" => source.as_str()
        )
        .increment(1);
    }

    /// `layer` 为 local 或 external
    pub fn record_cache_hit(layer: &'static str) {
        counter!("permission_cache_hits_total", "layer" => layer).increment(1);
    }

    pub fn record_cache_miss() {
        counter!("permission_cache_misses_total").increment(1);
    }

    pub fn record_audit_dropped() {
        counter!("permission_audit_dropped_total").increment(1);
    }

    pub fn record_audit_write_error() {
        counter!("permission_audit_write_errors_total").increment(1);
    }
}

/// 检查计时守卫
pub struct CheckTimer {
    start: Instant,
}

impl CheckTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn finish(self, allowed: bool, source: DecisionSource) {
        let elapsed_ms = self.start.elapsed().as_millis();
        CheckMetrics::record_check(self.start, allowed, source);

        // 慢检查日志 (阈值: 100ms)
        if elapsed_ms > 100 {
            tracing::warn!(
                source = %source,
                duration_ms = %elapsed_ms,
                "Slow permission check detected"
            );
        }
    }
}
