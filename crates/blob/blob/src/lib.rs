pub mod error;
pub mod retry;
pub mod store;
pub mod testing;

pub use error::BlobError;
pub use retry::{RetryPolicy, RetryingBlobStore};
pub use store::BlobStore;
