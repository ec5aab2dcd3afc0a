//! Permission authority
//!
//! Grants, auto-provisions and lists access-control entries that link external
//! subjects (users, groups) to external resources (apps, files, ...) at a
//! `read`, `write` or `own` level.

pub mod catalog;
pub mod entities;
pub mod errors;
pub mod grant;
pub mod identity;
pub mod models;
pub mod query;
pub mod settings;
pub mod storage;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
