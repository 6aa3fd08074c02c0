use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::member::Member;
use crate::models::message::{
    HistoryQuery, InboxCounts, MarkReadRequest, Message, MessageOut, MessageType,
    SendMessageRequest, ThreadCounts, ThreadKind, ADMIN_LABEL, MAX_MESSAGE_CHARS, SANTA_LABEL,
};
use crate::services::assignments::AssignmentService;
use crate::services::groups::GroupService;
use crate::services::members::MemberService;

/// Result of a send: the stored row, its wire shape, and where to publish
/// the `new_message` event. Broadcasts go on the group topic; directed
/// messages go to the recipient's inbox plus the sender's own (the echo the
/// issuing client reconciles against its optimistic append).
pub struct SendOutcome {
    pub message: Message,
    pub out: MessageOut,
    pub inboxes: Vec<Uuid>,
    pub broadcast: bool,
}

/// Result of a mark-read: which ids actually flipped, and whose inboxes
/// should hear about it (the reader's own sessions plus each sender).
pub struct MarkReadOutcome {
    pub flipped: Vec<Uuid>,
    pub reader_id: Uuid,
    pub sender_ids: Vec<Uuid>,
}

pub struct MessageService;

impl MessageService {
    pub async fn send(
        pool: &PgPool,
        group_id: Uuid,
        req: &SendMessageRequest,
    ) -> Result<SendOutcome, ApiError> {
        let body = validate_body(&req.body)?;
        let group = GroupService::fetch(pool, group_id).await?;
        let sender = MemberService::require_member(pool, group_id, req.credential).await?;
        let is_organizer = group.is_organizer(req.credential);

        // Resolve the thread. `anonymize` hides the sender behind the
        // "Secret Santa" label on the giver side of a santa thread.
        let (message_type, recipient, anonymize): (MessageType, Option<Member>, bool) =
            if req.is_group_message {
                if !is_organizer {
                    return Err(ApiError::NotAuthorized);
                }
                (MessageType::Broadcast, None, false)
            } else if req.to_secret_santa {
                if !group.is_frozen {
                    return Err(ApiError::NotFrozen);
                }
                let giver = AssignmentService::giver_of(pool, group_id, sender.id)
                    .await?
                    .ok_or(ApiError::NotFound)?;
                (MessageType::Santa, Some(giver), false)
            } else if let Some(name) = req
                .recipient_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
            {
                let target = find_by_name(pool, group_id, name)
                    .await?
                    .ok_or(ApiError::NotFound)?;
                if is_organizer {
                    (MessageType::Admin, Some(target), false)
                } else {
                    // A plain member may only address their own giftee, and
                    // then only anonymously.
                    if !group.is_frozen {
                        return Err(ApiError::NotFrozen);
                    }
                    let receiver = AssignmentService::receiver_of(pool, group_id, sender.id)
                        .await?
                        .ok_or(ApiError::NotFound)?;
                    if receiver.id != target.id {
                        return Err(ApiError::NotAuthorized);
                    }
                    (MessageType::Santa, Some(target), true)
                }
            } else {
                // Member → organizer thread.
                let organizer =
                    MemberService::find_by_credential(pool, group_id, group.organizer_code)
                        .await?
                        .ok_or(ApiError::NotFound)?;
                if sender.id == organizer.id {
                    return Err(ApiError::validation("a recipient is required"));
                }
                (MessageType::Admin, Some(organizer), false)
            };

        let recipient_id = recipient.as_ref().map(|m| m.id);
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (group_id, message_type, sender_id, recipient_id, body)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(group_id)
        .bind(message_type.to_string())
        .bind(sender.id)
        .bind(recipient_id)
        .bind(body)
        .fetch_one(pool)
        .await?;

        let sender_label = match message_type {
            MessageType::Broadcast => ADMIN_LABEL.to_string(),
            MessageType::Admin if is_organizer => ADMIN_LABEL.to_string(),
            MessageType::Santa if anonymize => SANTA_LABEL.to_string(),
            _ => sender.display_name().to_string(),
        };
        let out = to_out(&message, sender_label);

        let (inboxes, broadcast) = match recipient_id {
            None => (Vec::new(), true),
            Some(r) => (vec![r, sender.id], false),
        };
        Ok(SendOutcome {
            message,
            out,
            inboxes,
            broadcast,
        })
    }

    /// One thread of history, oldest first, from the caller's perspective.
    pub async fn history(
        pool: &PgPool,
        group_id: Uuid,
        q: &HistoryQuery,
    ) -> Result<Vec<MessageOut>, ApiError> {
        let group = GroupService::fetch(pool, group_id).await?;
        let me = MemberService::require_member(pool, group_id, q.credential).await?;

        let rows: Vec<Message> = match q.thread {
            ThreadKind::Group => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM messages
                     WHERE group_id = $1 AND message_type = 'broadcast'
                     ORDER BY created_at ASC
                     LIMIT $2 OFFSET $3",
                )
                .bind(group_id)
                .bind(q.per_page())
                .bind(q.offset())
                .fetch_all(pool)
                .await?
            }
            ThreadKind::Santa => {
                match AssignmentService::giver_of(pool, group_id, me.id).await? {
                    Some(giver) => fetch_pair_thread(pool, group_id, me.id, giver.id, q).await?,
                    // No draw (yet, or anymore): the thread has no counterparty.
                    None => Vec::new(),
                }
            }
            ThreadKind::Giftee => {
                match AssignmentService::receiver_of(pool, group_id, me.id).await? {
                    Some(receiver) => {
                        fetch_pair_thread(pool, group_id, me.id, receiver.id, q).await?
                    }
                    None => Vec::new(),
                }
            }
            ThreadKind::Admin => {
                let organizer =
                    MemberService::find_by_credential(pool, group_id, group.organizer_code)
                        .await?
                        .ok_or(ApiError::NotFound)?;
                let counterparty = if group.is_organizer(q.credential) {
                    let name = q
                        .member_name
                        .as_deref()
                        .ok_or_else(|| ApiError::validation("member_name is required"))?;
                    find_by_name(pool, group_id, name)
                        .await?
                        .ok_or(ApiError::NotFound)?
                } else {
                    organizer
                };
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM messages
                     WHERE group_id = $1 AND message_type = 'admin'
                       AND ((sender_id = $2 AND recipient_id = $3)
                         OR (sender_id = $3 AND recipient_id = $2))
                     ORDER BY created_at ASC
                     LIMIT $4 OFFSET $5",
                )
                .bind(group_id)
                .bind(me.id)
                .bind(counterparty.id)
                .bind(q.per_page())
                .bind(q.offset())
                .fetch_all(pool)
                .await?
            }
        };

        let members = member_map(pool, group_id).await?;
        let gives_to = gives_to_map(pool, group_id).await?;
        let organizer_id = members
            .values()
            .find(|m| m.member_code == group.organizer_code)
            .map(|m| m.id);

        Ok(rows
            .iter()
            .map(|m| {
                let label = sender_label(m, &members, organizer_id, &gives_to);
                to_out(m, label)
            })
            .collect())
    }

    /// Unread/total accounting for the caller's inbox, split by thread kind.
    pub async fn inbox_counts(
        pool: &PgPool,
        group_id: Uuid,
        credential: Uuid,
    ) -> Result<InboxCounts, ApiError> {
        let me = MemberService::require_member(pool, group_id, credential).await?;
        let giver = AssignmentService::giver_of(pool, group_id, me.id).await?;
        let receiver = AssignmentService::receiver_of(pool, group_id, me.id).await?;

        let santa = match &giver {
            Some(g) => pair_counts(pool, group_id, me.id, g.id, "santa").await?,
            None => ThreadCounts::default(),
        };
        let giftee = match &receiver {
            Some(r) => pair_counts(pool, group_id, me.id, r.id, "santa").await?,
            None => ThreadCounts::default(),
        };
        let (admin_unread, admin_total): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE NOT is_read), COUNT(*)
             FROM messages
             WHERE group_id = $1 AND message_type = 'admin' AND recipient_id = $2",
        )
        .bind(group_id)
        .bind(me.id)
        .fetch_one(pool)
        .await?;

        let admin = ThreadCounts {
            unread: admin_unread,
            total: admin_total,
        };
        Ok(InboxCounts {
            santa,
            giftee,
            admin,
            unread_total: santa.unread + giftee.unread + admin.unread,
        })
    }

    /// Flip the read flag on directed messages addressed to the caller.
    /// Re-marking an already-read message is a no-op, never an error.
    pub async fn mark_read(
        pool: &PgPool,
        group_id: Uuid,
        req: &MarkReadRequest,
    ) -> Result<MarkReadOutcome, ApiError> {
        if req.message_ids.is_empty() {
            return Err(ApiError::validation("no message ids given"));
        }
        let me = MemberService::require_member(pool, group_id, req.credential).await?;

        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "UPDATE messages SET is_read = TRUE
             WHERE group_id = $1 AND recipient_id = $2 AND id = ANY($3) AND is_read = FALSE
             RETURNING id, sender_id",
        )
        .bind(group_id)
        .bind(me.id)
        .bind(&req.message_ids)
        .fetch_all(pool)
        .await?;

        let flipped: Vec<Uuid> = rows.iter().map(|(id, _)| *id).collect();
        let mut sender_ids: Vec<Uuid> = rows.iter().map(|(_, s)| *s).collect();
        sender_ids.sort();
        sender_ids.dedup();
        sender_ids.retain(|s| *s != me.id);

        Ok(MarkReadOutcome {
            flipped,
            reader_id: me.id,
            sender_ids,
        })
    }
}

fn validate_body(body: &str) -> Result<&str, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::validation("the message is empty"));
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::validation(format!(
            "the message is too long ({MAX_MESSAGE_CHARS} characters max)"
        )));
    }
    Ok(body)
}

/// Label shown for a message's sender. Broadcasts and the organizer side of
/// admin threads read "Admin"; the giver side of a santa thread reads
/// "Secret Santa"; everything else shows the sender's display identity.
fn sender_label(
    message: &Message,
    members: &HashMap<Uuid, Member>,
    organizer_id: Option<Uuid>,
    gives_to: &HashMap<Uuid, Uuid>,
) -> String {
    match message.message_type.as_str() {
        "broadcast" => ADMIN_LABEL.to_string(),
        "admin" if Some(message.sender_id) == organizer_id => ADMIN_LABEL.to_string(),
        "santa"
            if message
                .recipient_id
                .is_some_and(|r| gives_to.get(&message.sender_id) == Some(&r)) =>
        {
            SANTA_LABEL.to_string()
        }
        _ => members
            .get(&message.sender_id)
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| "Former member".to_string()),
    }
}

fn to_out(message: &Message, sender_label: String) -> MessageOut {
    MessageOut {
        id: message.id,
        message_type: message.message_type.clone(),
        sender_label,
        recipient_id: message.recipient_id,
        body: message.body.clone(),
        is_read: message.is_read,
        created_at: message.created_at,
    }
}

async fn find_by_name(
    pool: &PgPool,
    group_id: Uuid,
    name: &str,
) -> Result<Option<Member>, ApiError> {
    let member = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE group_id = $1 AND LOWER(name) = LOWER($2)",
    )
    .bind(group_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(member)
}

async fn fetch_pair_thread(
    pool: &PgPool,
    group_id: Uuid,
    a: Uuid,
    b: Uuid,
    q: &HistoryQuery,
) -> Result<Vec<Message>, ApiError> {
    let rows = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages
         WHERE group_id = $1 AND message_type = 'santa'
           AND ((sender_id = $2 AND recipient_id = $3)
             OR (sender_id = $3 AND recipient_id = $2))
         ORDER BY created_at ASC
         LIMIT $4 OFFSET $5",
    )
    .bind(group_id)
    .bind(a)
    .bind(b)
    .bind(q.per_page())
    .bind(q.offset())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn pair_counts(
    pool: &PgPool,
    group_id: Uuid,
    me: Uuid,
    counterparty: Uuid,
    message_type: &str,
) -> Result<ThreadCounts, ApiError> {
    let (unread, total): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*) FILTER (WHERE NOT is_read), COUNT(*)
         FROM messages
         WHERE group_id = $1 AND message_type = $2
           AND recipient_id = $3 AND sender_id = $4",
    )
    .bind(group_id)
    .bind(message_type)
    .bind(me)
    .bind(counterparty)
    .fetch_one(pool)
    .await?;
    Ok(ThreadCounts { unread, total })
}

async fn member_map(pool: &PgPool, group_id: Uuid) -> Result<HashMap<Uuid, Member>, ApiError> {
    let members = sqlx::query_as::<_, Member>("SELECT * FROM members WHERE group_id = $1")
        .bind(group_id)
        .fetch_all(pool)
        .await?;
    Ok(members.into_iter().map(|m| (m.id, m)).collect())
}

async fn gives_to_map(pool: &PgPool, group_id: Uuid) -> Result<HashMap<Uuid, Uuid>, ApiError> {
    let rows: Vec<(Uuid, Uuid)> =
        sqlx::query_as("SELECT giver_id, receiver_id FROM assignments WHERE group_id = $1")
            .bind(group_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn body_must_not_be_blank() {
        assert!(validate_body("").is_err());
        assert!(validate_body("   ").is_err());
        assert!(validate_body("hello").is_ok());
    }

    #[test]
    fn body_limit_counts_characters_not_bytes() {
        let exactly = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_body(&exactly).is_ok());
        let over = "é".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(validate_body(&over).is_err());
    }

    fn member(name: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            group_id: Uuid::nil(),
            member_code: Uuid::new_v4(),
            name: name.to_string(),
            code_name: None,
            joined_at: Utc::now(),
        }
    }

    fn message(message_type: &str, sender: &Member, recipient: Option<&Member>) -> Message {
        Message {
            id: Uuid::new_v4(),
            group_id: Uuid::nil(),
            message_type: message_type.to_string(),
            sender_id: sender.id,
            recipient_id: recipient.map(|m| m.id),
            body: "hi".to_string(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn giver_side_of_santa_thread_is_anonymized() {
        let giver = member("gina");
        let receiver = member("rob");
        let members: HashMap<Uuid, Member> =
            [(giver.id, giver.clone()), (receiver.id, receiver.clone())].into();
        let gives_to: HashMap<Uuid, Uuid> = [(giver.id, receiver.id)].into();

        let from_giver = message("santa", &giver, Some(&receiver));
        assert_eq!(
            sender_label(&from_giver, &members, None, &gives_to),
            SANTA_LABEL
        );

        // The receiver writing back is not anonymous: their santa already
        // knows who they give to.
        let reply = message("santa", &receiver, Some(&giver));
        assert_eq!(sender_label(&reply, &members, None, &gives_to), "rob");
    }

    #[test]
    fn admin_and_broadcast_labels() {
        let organizer = member("olive");
        let other = member("pat");
        let members: HashMap<Uuid, Member> = [
            (organizer.id, organizer.clone()),
            (other.id, other.clone()),
        ]
        .into();
        let gives_to = HashMap::new();

        let broadcast = message("broadcast", &organizer, None);
        assert_eq!(
            sender_label(&broadcast, &members, Some(organizer.id), &gives_to),
            ADMIN_LABEL
        );

        let from_org = message("admin", &organizer, Some(&other));
        assert_eq!(
            sender_label(&from_org, &members, Some(organizer.id), &gives_to),
            ADMIN_LABEL
        );

        let from_member = message("admin", &other, Some(&organizer));
        assert_eq!(
            sender_label(&from_member, &members, Some(organizer.id), &gives_to),
            "pat"
        );
    }
}
