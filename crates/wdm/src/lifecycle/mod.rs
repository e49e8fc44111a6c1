//! Slot lifecycle across containers: copy and compaction.

pub mod compaction;
pub mod copy;

pub use compaction::{CompactionReport, SlotOutcome};
