pub mod aggregator;
pub mod confessions;
pub mod error;
pub mod feeds;
pub mod polls;
pub mod reactions;
pub mod state;
pub mod submit;
pub mod threads;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// REST routes. The WebSocket gateway is mounted by the server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/vaults", get(feeds::list_vaults))
        .route("/vaults/{vault_id}", get(feeds::get_vault))
        .route("/vaults/{vault_id}/threads", get(feeds::vault_threads))
        .route("/threads", get(feeds::list_threads))
        .route("/threads/{thread_id}", get(threads::get_thread))
        .route("/threads/{thread_id}/messages", post(threads::send_message))
        .route("/threads/{thread_id}/polls", post(polls::create_poll))
        .route("/messages/{message_id}/reactions", post(reactions::react))
        .route("/polls/{poll_id}/votes", post(polls::vote))
        .route("/confessions", post(confessions::submit))
        .route("/moderation/check", post(confessions::check))
        .with_state(state)
}
