pub mod api;
pub mod events;
pub mod identity;
pub mod models;
pub mod view;
