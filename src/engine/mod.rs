pub mod context;
pub mod counters;
pub mod cursor;
pub mod identity;
pub mod normalizer;
pub mod projection;
pub mod reference_index;
pub mod sink;

pub use context::ExecutionContext;
pub use counters::RunCounters;
pub use cursor::{BatchCursorProcessor, CursorSummary, DocumentVisitor, ReadSide};
pub use identity::{DerivedRole, derive_for_role, derive_object_id};
pub use normalizer::{build_set_update, collect_matching_paths};
pub use reference_index::{ReferenceIndex, ReferenceIndexBuilder, normalize_reference};
pub use sink::{DryRunSink, LiveSink, WriteSink};
