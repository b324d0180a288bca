pub mod chat_store;
pub mod error;
pub mod fs_store;
pub mod memory_store;
pub mod object_store;

pub use chat_store::ChatStore;
pub use error::{StoreError, StoreResult};
pub use fs_store::FsObjectStore;
pub use memory_store::MemoryObjectStore;
pub use object_store::{BoxFuture, ObjectMeta, ObjectStore};
