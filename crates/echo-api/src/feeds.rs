use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use echo_db::models::ThreadQuery;
use echo_types::models::Vault;
use echo_types::view::{FeedEntry, FeedFilter, FeedOrder};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedTab {
    /// Recently active, non-explicit
    #[default]
    Hot,
    /// Newest, non-explicit
    New,
    /// Newest, explicit only
    Nsfw,
}

impl FeedTab {
    fn order(self) -> FeedOrder {
        match self {
            Self::Hot => FeedOrder::Activity,
            Self::New | Self::Nsfw => FeedOrder::Created,
        }
    }

    fn explicit(self) -> Option<bool> {
        Some(self == Self::Nsfw)
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub tab: FeedTab,
    /// Signed-out viewers only see public threads.
    #[serde(default)]
    pub signed_in: bool,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct VaultFeedQuery {
    #[serde(default)]
    pub signed_in: bool,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub async fn list_vaults(State(state): State<AppState>) -> ApiResult<Json<Vec<Vault>>> {
    let vaults = blocking(&state.db, |db| db.list_vaults()).await?;
    Ok(Json(vaults))
}

pub async fn get_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> ApiResult<Json<Vault>> {
    blocking(&state.db, move |db| db.get_vault(vault_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("vault {}", vault_id)))
}

/// Feed across all vaults.
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<FeedEntry>>> {
    let query = ThreadQuery {
        vault_id: None,
        filter: FeedFilter {
            include_private: query.signed_in,
            explicit: query.tab.explicit(),
        },
        order: query.tab.order(),
        offset: query.offset,
        limit: query.limit.min(MAX_LIMIT),
    };
    let entries = blocking(&state.db, move |db| db.load_feed(&query)).await?;
    Ok(Json(entries))
}

pub async fn vault_threads(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
    Query(query): Query<VaultFeedQuery>,
) -> ApiResult<Json<Vec<FeedEntry>>> {
    let query = ThreadQuery {
        vault_id: Some(vault_id),
        filter: FeedFilter {
            include_private: query.signed_in,
            explicit: None,
        },
        order: FeedOrder::Activity,
        offset: query.offset,
        limit: query.limit.min(MAX_LIMIT),
    };

    let entries = blocking(&state.db, move |db| {
        if db.get_vault(vault_id)?.is_none() {
            return Ok(None);
        }
        db.load_feed(&query).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("vault {}", vault_id)))?;

    Ok(Json(entries))
}
