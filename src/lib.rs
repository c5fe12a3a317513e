//! # Digital Twin
//!
//! A personal professional "digital twin": an HTTP API that answers
//! natural-language questions about one person's career from a static
//! profile document.
//!
//! A question is classified into a category, matched against curated
//! interview answers, and otherwise answered from ranked knowledge snippets,
//! either retrieved from a hosted vector index or ranked locally by keyword
//! overlap. The answer text comes from a chat-completion model when one is
//! configured, and from deterministic templates otherwise. Every interaction
//! can be logged to SQLite for analytics.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────┐
//!   query ──────▶ │ Classifier │──▶ category + topic
//!                 └─────┬──────┘
//!                       ▼
//! ┌──────────────┐  ┌────────┐  ┌──────────────────┐
//! │  Knowledge   │─▶│ Ranker │◀─│ Retriever        │
//! │  (JSON)      │  └───┬────┘  │ Upstash / local  │
//! └──────────────┘      ▼       └──────────────────┘
//!                 ┌────────────────────┐
//!                 │ Generator          │
//!                 │ chat API / composer│
//!                 └─────────┬──────────┘
//!                           ▼
//!              ┌──────────┐   ┌──────────┐
//!              │   CLI    │   │   HTTP   │──▶ SQLite analytics
//!              │  (twin)  │   │  (axum)  │
//!              └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! twin init                                  # create analytics tables
//! twin ask "What are your core skills?"      # one-off answer
//! twin serve                                 # start HTTP server
//! twin verify http://127.0.0.1:8000          # check a deployment
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Query and backend error types |
//! | [`knowledge`] | Profile document loading |
//! | [`classify`] | Query categories and soft-skill topics |
//! | [`rank`] | Keyword relevance ranking |
//! | [`compose`] | Template answer composition |
//! | [`retrieval`] | Vector index and local retrievers |
//! | [`generation`] | Chat completion and composer generators |
//! | [`cache`] | Answer memoization |
//! | [`pipeline`] | Query routing and fallbacks |
//! | [`analytics`] | Chat logs and aggregates |
//! | [`server`] | HTTP API |
//! | [`verify`] | Deployment verification |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analytics;
pub mod cache;
pub mod classify;
pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod rank;
pub mod retrieval;
pub mod server;
pub mod verify;
