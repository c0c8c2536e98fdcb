//! Knowledge curation: reflect on a tick, curate the proposed deltas, and
//! persist the survivors into the playbook with Grow-and-Refine pruning.

pub mod curator;
pub mod delta;
pub mod playbook;
pub mod reflector;

pub use curator::Curator;
pub use delta::{
    AppliedDelta, ApplyStatus, ChangeType, CurationResult, DeltaDisposition, DeltaRecord,
    PlaybookDelta, RejectedDelta,
};
pub use playbook::{PlaybookConfig, PlaybookStore};
pub use reflector::Reflector;
