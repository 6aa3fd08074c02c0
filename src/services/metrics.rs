use lazy_static::lazy_static;
use prometheus::{register_counter, register_gauge, Counter, Gauge};

lazy_static! {
    pub static ref GROUPS_CREATED: Counter = register_counter!(
        "santa_groups_created_total",
        "Groups created"
    )
    .unwrap();

    pub static ref MEMBERS_JOINED: Counter = register_counter!(
        "santa_members_joined_total",
        "Members who joined a group"
    )
    .unwrap();

    pub static ref DRAWS_PERFORMED: Counter = register_counter!(
        "santa_draws_total",
        "Assignment draws performed"
    )
    .unwrap();

    pub static ref MESSAGES_SENT: Counter = register_counter!(
        "santa_messages_sent_total",
        "Messages sent"
    )
    .unwrap();

    pub static ref WS_SESSIONS: Gauge = register_gauge!(
        "santa_ws_sessions",
        "Open realtime sessions"
    )
    .unwrap();
}
