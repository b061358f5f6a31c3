//! 持久化层模块

pub mod memory;

pub use memory::InMemoryPermissionRepository;
