pub mod card;
pub mod notification;
pub mod performance;

pub use card::{
    CardFilter, CardOperation, CardSource, CardStatus, CardType, CardTypeStatus, MembershipCard,
    NewCard, NewCardOperation, OperationType,
};
pub use notification::{NewNotification, NotificationType};
pub use performance::{CoachPerformance, CompletedCourse};
