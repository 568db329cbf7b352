//! Feedback Controller (FC) Service Library
//!
//! This library provides the core functionality for the Retroflect
//! Feedback Controller - a stateful server that runs anonymized,
//! structured peer-feedback sessions:
//!
//! - Session lifecycle state machine (collecting -> aggregated -> gone)
//! - One room per participant, with rated notes authored about peers
//! - One-time note redistribution that flips "who wrote about whom" into
//!   per-room Positive/Negative lists, destroying authorship linkage
//! - One-shot expiration timers for free-tier sessions
//! - Per-session change-notification fan-out for connected observers
//!
//! # Architecture
//!
//! The FC uses an actor model hierarchy:
//!
//! ```text
//! SessionControllerActor (singleton per FC instance)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live session)
//!         ├── owns the session record and phase/lock guards
//!         └── owns the room/list/note subgraph
//! ```
//!
//! # Key Design Decisions
//!
//! - **One mailbox per session**: the actor loop is the per-session
//!   critical section; phase guards run in the same step as the
//!   mutations they protect
//! - **Seed-derived ids**: the same seed always maps to the same session
//!   without exposing a guessable sequential id
//! - **Convergent teardown**: explicit end and expired-timer end meet in
//!   one controller handler, so the cascade and the terminal broadcast
//!   exist exactly once
//! - **Anonymity by construction**: aggregation copies notes under fresh
//!   ids and broadcast payloads carry note counts, never authored text
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with appropriate status codes
//! - [`events`] - Per-session pub/sub event hub
//! - [`ident`] - Seed hashing and opaque token generation
//! - [`scheduler`] - One-shot session expiration timers

pub mod actors;
pub mod config;
pub mod errors;
pub mod events;
pub mod ident;
pub mod scheduler;
