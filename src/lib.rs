pub mod auction;
pub mod bidding;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod message_broker;
pub mod query;
pub mod realtime;
pub mod scheduler;
pub mod settlement;
pub mod state;
pub mod store;
