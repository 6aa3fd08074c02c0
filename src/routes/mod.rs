pub mod assignments;
pub mod groups;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod websocket;
