mod bucket_admin;
mod listing;
mod object_store;

pub use bucket_admin::BucketAdmin;
pub use listing::{object_listing, version_listing};
pub use object_store::{ObjectStore, Page};
