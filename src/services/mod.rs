pub mod assignments;
pub mod cron;
pub mod events;
pub mod graph;
pub mod groups;
pub mod locks;
pub mod members;
pub mod messages;
pub mod metrics;
