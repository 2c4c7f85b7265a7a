mod handler;
mod model;

pub use handler::{
    create_card, delete_card, freeze_card, get_card, get_card_by_no, get_card_operations,
    get_cards_by_user, list_cards, renew_card, transfer_card, unfreeze_card,
};
pub use model::{CardInfo, OperationResult};
