pub mod engine;
pub mod events;
pub mod model;
