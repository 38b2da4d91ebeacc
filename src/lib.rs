//! # Daling (Account & Session Service)
//!
//! `daling` runs the account backend shared by the Daling game clients and
//! website. It registers accounts, signs them in and keeps track of every
//! device an account is signed in on.
//!
//! ## Tokens & Sessions
//!
//! A login mints an HS256 bearer token binding the account id to one
//! session id. The account record holds the list of active sessions, so a
//! token whose signature still verifies is rejected once its session has
//! been removed. Signing out everywhere, changing the password and
//! resetting it all clear that list.
//!
//! ## Verification Codes
//!
//! Registration and password retrieval send a six digit code by email. A
//! code lives for five minutes in the ephemeral cache and a new one can be
//! requested once the previous one is a minute old. Codes are consumed on
//! success.
//!
//! ## Storage
//!
//! Accounts and ephemeral entries live in `PostgreSQL` (see `sql/schema.sql`).
//! Without a DSN the service falls back to in-memory stores, which is what
//! the test suite uses.

pub mod account;
pub mod api;
pub mod auth;
pub mod captcha;
pub mod cli;
pub mod mail;
pub mod model;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
