//! Gamification engine backend: metric and achievement CRUD plus the trigger
//! evaluator that turns metric updates into achievement unlocks and cascaded
//! rewards. The binary in `main.rs` serves the router over HTTP; the library
//! surface exists so integration tests can drive the router directly.

pub mod telemetry;
pub mod util;
pub mod domain;
pub mod error;
pub mod config;
pub mod store;
pub mod registry;
pub mod state;
pub mod protocol;
pub mod logic;
pub mod routes;
