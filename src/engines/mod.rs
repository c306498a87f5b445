//! Reasoning strategy engines.
//!
//! Each engine turns a task request into an outcome using the shared
//! [`EngineCore`]: single-shot analysis, a sequential thinking chain, or a
//! multi-agent discussion. Engines return strategy-level errors and leave
//! degradation decisions to the fallback manager.

mod core;
pub mod discussion;
pub mod sequential;
pub mod single;

pub use core::EngineCore;
pub use discussion::{DiscussionEngine, DiscussionOutcome, DiscussionParams};
pub use sequential::{ChainOutcome, ChainStep, SequentialEngine, SequentialParams};
pub use single::{SingleEngine, SingleOutcome, SingleParams};
