#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod create_post;
pub mod data;
pub mod edit_post;
pub mod fetch;
pub mod form;
pub mod home;
pub mod keys;
pub mod logging;
pub mod markdown;
pub mod profile;
pub mod router;
pub mod screen;
pub mod search;
pub mod session;
pub mod state;
pub mod storage;
pub mod ui;
pub mod view_post;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
