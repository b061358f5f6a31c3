//! 通用类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 审计信息
///
/// 操作人以外部系统的主体标识记录，不限定为 UUID。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl AuditInfo {
    pub fn new(actor: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor,
        }
    }

    /// 记录一次修改
    pub fn touch(&mut self, actor: Option<String>) {
        self.updated_at = Utc::now();
        if actor.is_some() {
            self.updated_by = actor;
        }
    }
}

impl Default for AuditInfo {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.page_size as usize
    }

    /// 对已经排好序的完整结果做内存分页
    pub fn slice<T: Clone>(&self, all: &[T]) -> Vec<T> {
        all.iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .cloned()
            .collect()
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_slice() {
        let all: Vec<u32> = (1..=25).collect();
        let page = Pagination::new(3, 10);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.slice(&all), vec![21, 22, 23, 24, 25]);

        let result = PagedResult::new(page.slice(&all), all.len() as u64, &page);
        assert_eq!(result.total_pages(), 3);
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let page = Pagination::new(0, 5);
        assert_eq!(page.page, 1);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_audit_touch_keeps_previous_actor() {
        let mut audit = AuditInfo::new(Some("alice".into()));
        audit.touch(None);
        assert_eq!(audit.updated_by.as_deref(), Some("alice"));
        audit.touch(Some("bob".into()));
        assert_eq!(audit.updated_by.as_deref(), Some("bob"));
        assert!(audit.updated_at >= audit.created_at);
    }
}
