//! Sacristan — client-side session and token lifecycle management for the
//! parish administration backend.
//!
//! The crate keeps a signed-in session alive and honest: it stores the
//! rotating token pair, refreshes the access token proactively before expiry
//! and reactively on a 401, tracks user inactivity through a warn-then-logout
//! countdown, and propagates logouts across clients sharing one store.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sacristan::api::HttpParishApi;
//! use sacristan::config::load_config;
//! use sacristan::session::SessionManager;
//! use sacristan::store::MemoryStore;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let api = Arc::new(HttpParishApi::new(&config.base_url, config.http_timeout).unwrap());
//! let session = SessionManager::new(api, Arc::new(MemoryStore::new()), &config);
//! let user = session.login("ana@example.org", "secret").await.unwrap();
//! println!("signed in as {}", user.email);
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
#[cfg(test)]
pub mod testsupport;
pub mod timer;
pub mod types;
