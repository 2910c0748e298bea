mod batch_reorganizer;
mod bucket_service_impl;
mod multipart_assembler;
mod object_service_impl;
mod versioning_service_impl;

pub use batch_reorganizer::BatchReorganizer;
pub use bucket_service_impl::BucketServiceImpl;
pub use multipart_assembler::MultipartAssembler;
pub use object_service_impl::{sniff_media_type, ObjectServiceImpl, IMPORTABLE_MEDIA_TYPES};
pub use versioning_service_impl::VersioningServiceImpl;
