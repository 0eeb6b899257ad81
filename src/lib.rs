// src/lib.rs

//! Bounded-concurrency batch orchestrator.
//!
//! [`batch`] holds the reusable core (worker pool, rate limiting, retry,
//! cancellation, progress). [`pipeline`] wires it to the keyword, product
//! and cafe features through the collaborator traits in [`services`].

pub mod batch;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
