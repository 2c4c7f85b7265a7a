// Postgres 存储库实现

pub mod card;
pub mod card_type;
pub mod notification;
pub mod performance;

pub use card::CardRepository;
pub use card_type::{CardTypeRepository, UserRepository};
pub use notification::NotificationRepository;
pub use performance::PerformanceRepository;
