// 会员卡生命周期引擎

pub mod lifecycle;
mod lock;
mod service;

pub use lifecycle::{Mutation, MutationContext};
pub use lock::{CardLockGuard, CardLocks};
pub use service::{CardService, CreateCardInput, generate_card_no};
