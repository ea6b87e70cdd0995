//! # Vault Gateway
//!
//! A tool-dispatch gateway over a personal knowledge vault.
//!
//! Clients invoke named tools (`read_note`, `search`, `ask_vault`, ...) with
//! JSON parameters and always receive the same result envelope. Every call
//! to the vault goes through one rate-limited, cached, retrying transport;
//! search fuses BM25, embedding similarity, and term proximity into a single
//! deterministic ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────────────────────────┐   ┌───────┐
//! │ CLI/HTTP │──▶│ Dispatcher │──▶│ ResilientTransport            │──▶│ Vault │
//! └──────────┘   └─────┬──────┘   │ rate limit → cache → retry    │   └───────┘
//!                      │          └───────────────────────────────┘
//!                      ▼                         ▲
//!               ┌──────────────┐                 │
//!               │ SearchEngine │─────────────────┘
//!               │ BM25+cos+prox│──▶ InferenceProvider
//!               └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy and envelope categories |
//! | [`rate_limit`] | Token-bucket rate limiter |
//! | [`cache`] | TTL response and embedding caches |
//! | [`transport`] | Retry/backoff transport and vault backends |
//! | [`vault`] | Typed vault client and in-memory backend |
//! | [`inference`] | Embedding and completion providers |
//! | [`search`] | Hybrid search engine and scorers |
//! | [`tools`] | Tool registry, dispatcher, built-in tools |
//! | [`gateway`] | Assembly from configuration |
//! | [`server`] | HTTP server |

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod tools;
pub mod transport;
pub mod vault;
