pub mod catalog;
pub mod coordinator;
pub mod history;
pub mod lifecycle;
pub mod live_status;
pub mod messages;
pub mod persist;
pub mod ranking;
pub mod refresher;
pub mod roster;
pub mod scanner;
pub mod season_store;
pub mod settings;
