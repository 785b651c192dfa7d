pub mod assistant;
pub mod chat;
