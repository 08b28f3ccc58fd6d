pub mod app;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod items;
pub mod mailer;
pub mod packs;
pub mod state;
pub mod storage;
pub mod sync;
pub mod upload;
pub mod weather;
pub mod weights;
