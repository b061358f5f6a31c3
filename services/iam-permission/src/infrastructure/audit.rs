//! 异步审计日志
//!
//! 检查路径只把记录放进有界队列，由后台任务写入仓储。队列已满时直接丢弃并计数，
//! 写入失败只记录日志，都不会影响检查结果。

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::metrics::CheckMetrics;
use crate::domain::{PermissionAuditLog, PermissionRepository};

pub struct AuditLogger {
    sender: mpsc::Sender<PermissionAuditLog>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// 启动后台写入任务，必须在 tokio 运行时内调用
    pub fn start<R>(repo: Arc<R>, capacity: usize) -> Self
    where
        R: PermissionRepository + ?Sized + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(repo, receiver, shutdown.clone()));

        Self {
            sender,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 入队，不等待。返回是否成功入队
    pub fn record(&self, log: PermissionAuditLog) -> bool {
        match self.sender.try_send(log) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(log)) => {
                warn!(
                    user_id = %log.user_id,
                    tenant_id = %log.tenant_id,
                    resource = %log.resource,
                    action = %log.action,
                    "Audit queue full, dropping record"
                );
                CheckMetrics::record_audit_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Audit logger stopped, dropping record");
                CheckMetrics::record_audit_dropped();
                false
            }
        }
    }

    /// 停止接收并写完队列中剩余的记录
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Audit worker terminated abnormally");
            }
        }
    }
}

impl Drop for AuditLogger {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker<R>(
    repo: Arc<R>,
    mut receiver: mpsc::Receiver<PermissionAuditLog>,
    shutdown: CancellationToken,
) where
    R: PermissionRepository + ?Sized,
{
    debug!("Audit worker started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(log) => write(repo.as_ref(), &log).await,
                None => break,
            },
        }
    }

    receiver.close();
    let mut drained = 0usize;
    while let Some(log) = receiver.recv().await {
        write(repo.as_ref(), &log).await;
        drained += 1;
    }
    info!(drained, "Audit worker stopped");
}

async fn write<R>(repo: &R, log: &PermissionAuditLog)
where
    R: PermissionRepository + ?Sized,
{
    if let Err(e) = repo.create_permission_audit_log(log).await {
        error!(
            error = %e,
            user_id = %log.user_id,
            resource = %log.resource,
            action = %log.action,
            "Failed to write permission audit log"
        );
        CheckMetrics::record_audit_write_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::MockPermissionRepository;
    use crate::domain::{CheckMode, PermissionCheckRequest, PermissionCheckResponse};
    use cuba_errors::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_log() -> PermissionAuditLog {
        let req = PermissionCheckRequest::new("u1", "t1", "doc", "read");
        PermissionAuditLog::from_check(&req, &PermissionCheckResponse::default_deny(), CheckMode::Strict)
    }

    #[tokio::test]
    async fn test_records_are_written_before_shutdown_returns() {
        let written = Arc::new(AtomicUsize::new(0));
        let counter = written.clone();

        let mut repo = MockPermissionRepository::new();
        repo.expect_create_permission_audit_log().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let logger = AuditLogger::start(Arc::new(repo), 16);
        for _ in 0..5 {
            assert!(logger.record(sample_log()));
        }
        logger.shutdown().await;

        assert_eq!(written.load(Ordering::SeqCst), 5);
        assert!(!logger.record(sample_log()));
    }

    #[tokio::test]
    async fn test_write_failures_do_not_stop_worker() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let mut repo = MockPermissionRepository::new();
        repo.expect_create_permission_audit_log().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::database("connection reset"))
        });

        let logger = AuditLogger::start(Arc::new(repo), 16);
        logger.record(sample_log());
        logger.record(sample_log());
        logger.shutdown().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_records() {
        let mut repo = MockPermissionRepository::new();
        repo.expect_create_permission_audit_log().returning(|_| Ok(()));

        // 单线程运行时下 worker 在本任务让出前不会消费
        let logger = AuditLogger::start(Arc::new(repo), 1);
        assert!(logger.record(sample_log()));
        assert!(!logger.record(sample_log()));
        logger.shutdown().await;
    }
}
