mod handler;

pub use handler::{
    expired_cards, expiring_cards, expiry_status, performance_status, trigger_expiry_check,
    trigger_performance_update,
};
