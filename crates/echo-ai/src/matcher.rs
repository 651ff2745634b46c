//! Echo matching: pick the prior confessions a new one is threaded with.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use echo_types::models::Confession;

use crate::backend::{CompletionBackend, CompletionRequest};

/// Upper bound on the candidate pool handed to the matcher.
pub const CANDIDATE_POOL: u32 = 50;
/// Companions per thread.
pub const MATCH_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: Uuid,
    pub content: String,
}

impl From<&Confession> for Candidate {
    fn from(c: &Confession) -> Self {
        Self {
            id: c.id,
            content: c.content.clone(),
        }
    }
}

pub struct Matcher {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl Matcher {
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        Self { backend }
    }

    /// Up to `k` candidate ids, most similar first. `source_id` is never
    /// returned, even if present in `candidates`.
    pub async fn select_matches(
        &self,
        source_id: Uuid,
        content: &str,
        candidates: &[Candidate],
        k: usize,
    ) -> Vec<Uuid> {
        let pool: Vec<&Candidate> = candidates.iter().filter(|c| c.id != source_id).collect();

        if pool.len() < k {
            return pool.iter().map(|c| c.id).collect();
        }

        if let Some(backend) = &self.backend {
            match self.rank_with(backend.as_ref(), content, &pool, k).await {
                Some(ids) => return ids,
                None => debug!("Falling back to word-overlap matching"),
            }
        }

        jaccard_top_k(content, &pool, k)
    }

    async fn rank_with(
        &self,
        backend: &dyn CompletionBackend,
        content: &str,
        pool: &[&Candidate],
        k: usize,
    ) -> Option<Vec<Uuid>> {
        let listing: Vec<String> = pool
            .iter()
            .map(|c| format!("{}: {:?}", c.id, c.content))
            .collect();
        let prompt = format!(
            "Match this new confession to the {k} most emotionally similar ones from the list.\n\
             Return ONLY a JSON array of their ids, most similar first.\n\n\
             New confession: {content:?}\n\nCandidates:\n{}",
            listing.join("\n")
        );

        let answer = match backend.complete(&CompletionRequest::new(prompt, 0.3)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("{} matching failed: {:#}", backend.name(), e);
                return None;
            }
        };

        let known: HashSet<Uuid> = pool.iter().map(|c| c.id).collect();
        let Some(parsed) = parse_id_array(&answer) else {
            warn!("{} returned no id array", backend.name());
            return None;
        };

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = parsed
            .into_iter()
            .filter(|id| known.contains(id) && seen.insert(*id))
            .take(k)
            .collect();

        if ids.is_empty() { None } else { Some(ids) }
    }
}

/// First `[...]` literal in `text`, read as a list of ids. Anything after the
/// literal is ignored. Unparsable entries are dropped.
pub fn parse_id_array(text: &str) -> Option<Vec<Uuid>> {
    let start = text.find('[')?;
    let values: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Vec<serde_json::Value>>()
        .next()?
        .ok()?;
    Some(
        values
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.trim().parse().ok())
            .collect(),
    )
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Deterministic ranking by word-set overlap. Ties keep candidate order.
pub fn jaccard_top_k(content: &str, pool: &[&Candidate], k: usize) -> Vec<Uuid> {
    let target = word_set(content);
    let mut scored: Vec<(Uuid, f64)> = pool
        .iter()
        .map(|c| (c.id, jaccard(&target, &word_set(&c.content))))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(k).map(|(id, _)| id).collect()
}
