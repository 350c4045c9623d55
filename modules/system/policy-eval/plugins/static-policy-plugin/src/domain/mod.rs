//! Domain layer for the static policy plugin.

mod client;
pub mod service;

pub use client::StaticPolicyEvaluator;
pub use service::{Service, Verdict};
