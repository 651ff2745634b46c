use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use uuid::Uuid;

use echo_ai::EchoAi;
use echo_ai::backend::{CompletionBackend, CompletionRequest};
use echo_ai::moderation::SemanticModeration;
use echo_api::submit::{SubmitError, submit_confession};
use echo_db::Database;
use echo_db::threads::now;
use echo_types::api::SubmitConfessionRequest;
use echo_types::identity::participant_key;
use echo_types::models::{Confession, Visibility};

const LOVE: Uuid = Uuid::from_u128(1);
const STRESS: Uuid = Uuid::from_u128(2);

struct Failing;

#[async_trait]
impl CompletionBackend for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        bail!("connection refused")
    }
}

struct Fixed(&'static str);

#[async_trait]
impl CompletionBackend for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn with_completion(backend: Arc<dyn CompletionBackend>) -> EchoAi {
    EchoAi::with_backends(
        Some(backend.clone()),
        Some(Arc::new(SemanticModeration::new(backend))),
    )
}

fn request(vault_id: Uuid, content: &str) -> SubmitConfessionRequest {
    SubmitConfessionRequest {
        content: content.to_string(),
        title: None,
        vault_id,
        mood: "😐".to_string(),
        visibility: Visibility::Public,
        owner_id: None,
        device_token: None,
    }
}

fn prior(db: &Database, vault_id: Uuid, content: &str) -> Confession {
    let c = Confession {
        id: Uuid::new_v4(),
        vault_id,
        title: None,
        content: content.to_string(),
        mood: "😐".to_string(),
        visibility: Visibility::Public,
        owner_id: None,
        anon_hash: participant_key(content),
        is_explicit: false,
        created_at: now(),
    };
    db.insert_confession(&c).unwrap();
    c
}

#[tokio::test]
async fn first_confession_gets_a_thread_of_its_own() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ai = EchoAi::offline();

    let mut req = request(LOVE, "  I miss my ex ");
    req.device_token = Some("device-1".into());
    let outcome = submit_confession(&db, &ai, req).await.unwrap();

    assert_eq!(outcome.messages.len(), 1);
    assert_eq!(outcome.messages[0].confession_id, Some(outcome.confession.id));
    assert_eq!(outcome.messages[0].content, "I miss my ex");
    assert_eq!(outcome.confession.anon_hash, participant_key("device-1"));
    assert_eq!(outcome.messages[0].anon_hash, outcome.confession.anon_hash);
    assert_eq!(outcome.thread.title, "I miss my ex");
    assert_eq!(outcome.thread.last_activity_at, outcome.thread.created_at);

    let stored = db.get_thread(outcome.thread.id).unwrap().unwrap();
    assert_eq!(stored, outcome.thread);
}

#[tokio::test]
async fn supplied_title_wins() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut req = request(LOVE, "I still think about the summer we met every day");
    req.title = Some("  Summer  ".into());
    let outcome = submit_confession(&db, &EchoAi::offline(), req).await.unwrap();
    assert_eq!(outcome.thread.title, "Summer");
    assert_eq!(outcome.confession.title.as_deref(), Some("Summer"));
}

#[tokio::test]
async fn word_overlap_picks_the_similar_confessions() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let test = prior(&db, STRESS, "I failed my test");
    let driving = prior(&db, STRESS, "I failed my driving test");
    let again = prior(&db, STRESS, "failed again today");
    let pizza = prior(&db, STRESS, "pizza is the best food");
    prior(&db, LOVE, "I failed my exam too");

    let outcome = submit_confession(&db, &EchoAi::offline(), request(STRESS, "I failed my exam"))
        .await
        .unwrap();

    let companions: Vec<Option<Uuid>> = outcome.messages[1..]
        .iter()
        .map(|m| m.confession_id)
        .collect();
    assert_eq!(companions, vec![Some(test.id), Some(driving.id), Some(again.id)]);
    assert!(!companions.contains(&Some(pizza.id)));
    assert_eq!(outcome.messages[1].anon_hash, test.anon_hash);
    assert_eq!(outcome.thread.title, "I failed my exam");
}

#[tokio::test]
async fn small_vault_takes_everyone() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    prior(&db, LOVE, "pizza is the best food");
    prior(&db, LOVE, "my cat ran away");

    let outcome = submit_confession(&db, &EchoAi::offline(), request(LOVE, "I failed my exam"))
        .await
        .unwrap();
    assert_eq!(outcome.messages.len(), 3);
}

#[tokio::test]
async fn explicit_keyword_survives_failing_backends() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ai = with_completion(Arc::new(Failing));

    let outcome = submit_confession(&db, &ai, request(LOVE, "I sent him a nude last night"))
        .await
        .unwrap();

    assert!(outcome.verdict.is_explicit);
    assert!(outcome.confession.is_explicit);
    assert!(outcome.thread.is_explicit);
    // Title falls back too
    assert_eq!(outcome.thread.title, "I sent him a...");
}

#[tokio::test]
async fn toxic_content_is_rejected_and_not_stored() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ai = with_completion(Arc::new(Fixed(
        r#"{"toxic": true, "explicit": false, "score": 0.97}"#,
    )));

    let err = submit_confession(&db, &ai, request(LOVE, "everyone in my class is worthless"))
        .await
        .unwrap_err();
    match err {
        SubmitError::Rejected { score } => assert_eq!(score, 0.97),
        other => panic!("expected rejection, got {:?}", other),
    }

    assert!(db.recent_confessions(LOVE, Uuid::nil(), 50).unwrap().is_empty());
}

#[tokio::test]
async fn invalid_submissions() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let ai = EchoAi::offline();

    let err = submit_confession(&db, &ai, request(LOVE, "   ")).await.unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(_)));

    let err = submit_confession(&db, &ai, request(Uuid::new_v4(), "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(_)));
}
