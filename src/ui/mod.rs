pub mod conversation;
pub mod terminal;
