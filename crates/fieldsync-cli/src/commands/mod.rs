pub mod common;
pub mod config;
pub mod delete;
pub mod get;
pub mod list;
pub mod login;
pub mod save;
pub mod status;
pub mod sync;
pub mod upload;
