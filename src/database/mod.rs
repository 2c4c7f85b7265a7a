// 数据库模块
// 包含数据库实体定义、存储边界和存储库实现

pub mod memory; // 内存实现
pub mod models; // 数据库实体定义
pub mod repositories; // Postgres 存储库
pub mod store; // 存储 trait

// 重新导出常用类型和函数，方便其他模块使用
pub use memory::MemoryStore;
pub use repositories::{
    CardRepository, CardTypeRepository, NotificationRepository, PerformanceRepository,
    UserRepository,
};
pub use store::{
    CardStore, CardTypeRegistry, IdentityProvider, NotificationSink, PerformanceStore, StoreResult,
};
