#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod http;

pub use builders::GrantBuilder;
pub use db::{seed_app_state, TestDb};
pub use http::{empty_request, json_request, read_json};
