//! Confession submission: moderate, persist, match, title, thread.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use echo_ai::EchoAi;
use echo_ai::matcher::{CANDIDATE_POOL, Candidate, MATCH_COUNT};
use echo_db::Database;
use echo_db::models::NewThread;
use echo_db::threads::now;
use echo_types::api::{ModerationVerdict, SubmitConfessionRequest};
use echo_types::identity::participant_key;
use echo_types::models::{Confession, EchoThread, ThreadMessage};

use crate::aggregator::ThreadAggregator;
use crate::state::blocking;

pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Moderation flagged the content toxic. Nothing was stored.
    #[error("Content rejected by moderation (score {score:.2})")]
    Rejected { score: f64 },

    #[error("Invalid submission: {0}")]
    Invalid(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub confession: Confession,
    pub thread: EchoThread,
    /// Seed first, then the resolved companions.
    pub messages: Vec<ThreadMessage>,
    pub verdict: ModerationVerdict,
}

/// A pseudonym for submitters without a device token, shaped like a
/// participant key.
fn random_anon_hash() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub async fn submit_confession(
    db: &Arc<Database>,
    ai: &EchoAi,
    req: SubmitConfessionRequest,
) -> Result<SubmitOutcome, SubmitError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(SubmitError::Invalid("Content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(SubmitError::Invalid(format!(
            "Content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    let title = non_blank(req.title);
    if title.as_ref().is_some_and(|t| t.chars().count() > MAX_TITLE_CHARS) {
        return Err(SubmitError::Invalid(format!(
            "Title exceeds {} characters",
            MAX_TITLE_CHARS
        )));
    }

    let vault_id = req.vault_id;
    if blocking(db, move |db| db.get_vault(vault_id)).await?.is_none() {
        return Err(SubmitError::Invalid(format!("Unknown vault {}", vault_id)));
    }

    let verdict = ai.moderator.classify(&content).await;
    if verdict.is_toxic {
        info!("Submission to vault {} rejected (score {:.2})", vault_id, verdict.score);
        return Err(SubmitError::Rejected {
            score: verdict.score,
        });
    }

    let anon_hash = match non_blank(req.device_token) {
        Some(token) => participant_key(&token),
        None => random_anon_hash(),
    };

    let confession = Confession {
        id: Uuid::new_v4(),
        vault_id,
        title: title.clone(),
        content,
        mood: req.mood,
        visibility: req.visibility,
        owner_id: non_blank(req.owner_id),
        anon_hash,
        is_explicit: verdict.is_explicit,
        created_at: now(),
    };

    let stored = confession.clone();
    blocking(db, move |db| db.insert_confession(&stored)).await?;

    let confession_id = confession.id;
    let pool =
        blocking(db, move |db| db.recent_confessions(vault_id, confession_id, CANDIDATE_POOL))
            .await?;
    let candidates: Vec<Candidate> = pool.iter().map(Candidate::from).collect();

    let matched = ai
        .matcher
        .select_matches(confession.id, &confession.content, &candidates, MATCH_COUNT)
        .await;

    let title = match title {
        Some(title) => title,
        None => ai.titles.title(&confession.content).await,
    };

    let new = NewThread {
        vault_id,
        title,
        visibility: confession.visibility,
        is_explicit: verdict.is_explicit,
        owner_id: confession.owner_id.clone(),
    };
    let (thread, messages) = ThreadAggregator::new(db.clone())
        .create(new, confession.clone(), &matched, &pool)
        .await?;

    info!(
        "Confession {} threaded into {} with {} companions",
        confession.id,
        thread.id,
        messages.len() - 1
    );

    Ok(SubmitOutcome {
        confession,
        thread,
        messages,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hashes_look_like_participant_keys() {
        let a = random_anon_hash();
        assert_eq!(a.len(), participant_key("x").len());
        assert_ne!(a, random_anon_hash());
    }

    #[test]
    fn blank_strings_are_absent() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" hi ".into())), Some("hi".into()));
        assert_eq!(non_blank(None), None);
    }
}
