//! The matching engine: text normalization and scoring, the rule engine,
//! suggestion generation, and the auto-match batch pass.
//!
//! Everything except the batch pass itself is pure - persistence and
//! directory access stay behind the [`automatch::MatchStore`] seam.

pub mod amount;
pub mod automatch;
pub mod rules;
pub mod suggest;
pub mod text;
