//! `gatewarden-classifier` — the external moderation classifier.
//!
//! One OpenRouter chat-completion request per call, with a hard deadline and
//! a single retry. Every failure mode collapses to `None`: the moderation
//! pipeline treats the classifier as advisory and must never fail because of
//! it.

pub mod client;
pub mod types;

pub use client::Classifier;
pub use types::AiDecision;
