//! Effective configuration: ini codec and environment override merging.

mod ini;
mod merge;

pub use ini::{EffectiveConfig, Section};
pub use merge::{MergedConfig, apply_overrides, merge_config, parse_override};
