use chrono::{Duration, Utc};
use uuid::Uuid;

use echo_types::models::{Confession, Visibility};

/// The seeded "Love" vault.
pub(crate) fn love_vault() -> Uuid {
    Uuid::from_u128(1)
}

pub(crate) fn confession(vault_id: Uuid, content: &str, age_secs: i64) -> Confession {
    Confession {
        id: Uuid::new_v4(),
        vault_id,
        title: None,
        content: content.into(),
        mood: "😭".into(),
        visibility: Visibility::Public,
        owner_id: None,
        anon_hash: format!("hash-{}", content.len()),
        is_explicit: false,
        created_at: Utc::now() - Duration::seconds(age_secs),
    }
}
