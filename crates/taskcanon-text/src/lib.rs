//! Text primitives for maintenance-task canonicalization
//!
//! Every function in this crate is pure and total:
//!
//! - [`normalize`]: case folding, diacritic stripping, non-letter removal,
//!   whitespace collapse (idempotent).
//! - [`extract_action`] / [`extract_object`]: split a phrase into its action
//!   unit and the object remainder.
//! - [`edit_distance`] / [`similarity`]: Levenshtein distance over
//!   re-cleaned strings and its normalized similarity.
//! - [`stem`]: strip a fixed set of Portuguese inflectional suffixes.
//! - [`SynonymTable`]: flat surface → canonical mapping loaded from JSON.

pub mod distance;
pub mod normalize;
pub mod stem;
pub mod synonym;

pub use distance::{clean_for_distance, edit_distance, levenshtein, similarity, within_distance};
pub use normalize::{
    extract_action, extract_object, normalize, ActionRules, DEFAULT_MIN_SECOND_TOKEN_LEN,
    DEFAULT_STOP_WORDS,
};
pub use stem::{stem, STEM_SUFFIXES};
pub use synonym::{SynonymError, SynonymTable};
