//! Demo group seed script
//!
//! Seeds one complete draw end-to-end: a group, five members, the
//! assignment, and a couple of messages. Prints every credential so the
//! demo can be driven from the API afterwards.
//!
//! Usage:
//!   DATABASE_URL=... ./seed-demo
//!
//! Environment variables:
//!   DATABASE_URL — PostgreSQL connection string (required)

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::env;
use uuid::Uuid;

use santa_api::models::group::CreateGroupRequest;
use santa_api::models::member::JoinGroupRequest;
use santa_api::models::message::SendMessageRequest;
use santa_api::services::assignments::AssignmentService;
use santa_api::services::groups::GroupService;
use santa_api::services::members::MemberService;
use santa_api::services::messages::MessageService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL required")?;

    println!("=== Seed Demo Group ===");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    santa_api::db::run_migrations(&pool).await?;

    let organizer_code = Uuid::new_v4();
    let group = GroupService::create(
        &pool,
        &CreateGroupRequest {
            credential: organizer_code,
            name: "Office Secret Santa".to_string(),
            description: Some("Demo draw — December gift exchange".to_string()),
            capacity: 10,
            is_open: true,
            password: None,
            use_code_names: false,
            auto_assign_code_names: false,
            use_custom_code_names: false,
            expires_at: None,
            code_name_pool: vec![],
            organizer_name: "Olive".to_string(),
            organizer_code_name: None,
        },
    )
    .await?;
    println!("group: {}", group.id);

    let mut credentials = Vec::new();
    for name in ["Alice", "Bob", "Carol", "Dave"] {
        let credential = Uuid::new_v4();
        MemberService::join(
            &pool,
            group.id,
            &JoinGroupRequest {
                credential,
                name: name.to_string(),
                password: None,
                code_name: None,
            },
        )
        .await?;
        println!("joined: {name}");
        credentials.push((name, credential));
    }

    let drawn = AssignmentService::assign(&pool, group.id, organizer_code).await?;
    println!("drawn: {} assignments, group frozen", drawn.len());

    MessageService::send(
        &pool,
        group.id,
        &SendMessageRequest {
            credential: organizer_code,
            body: "Welcome! The draw is done — check who you give to.".to_string(),
            is_group_message: true,
            to_secret_santa: false,
            recipient_name: None,
        },
    )
    .await?;

    let (_, alice_code) = credentials[0];
    MessageService::send(
        &pool,
        group.id,
        &SendMessageRequest {
            credential: alice_code,
            body: "Any wishlist hints for me?".to_string(),
            is_group_message: false,
            to_secret_santa: true,
            recipient_name: None,
        },
    )
    .await?;
    println!("messages sent");

    println!("\norganizer credential: {organizer_code}");
    for (name, credential) in &credentials {
        println!("{name}: {credential}");
    }

    Ok(())
}
