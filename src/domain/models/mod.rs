pub mod bucket;
pub mod multipart;
pub mod object;
pub mod reorganize;
pub mod version;

pub use bucket::{BucketBatchResult, BucketInfo, PolicyDocument, PolicyStatement};
pub use multipart::{PartRecord, SessionState, UploadProgress, UploadSession};
pub use object::{
    BulkDeleteOutcome, ObjectDescriptor, ObjectHead, ObjectIdentifier, ObjectSummary,
};
pub use reorganize::{
    BatchFailure, BatchResult, ClassificationRule, PlanEntry, ReorganizePlan, UNCLASSIFIED,
};
pub use version::{ObjectVersion, PruneReport, VersionHistory, VersionSelector};
