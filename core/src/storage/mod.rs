pub mod document;
pub mod firestore;
pub mod kv;
pub mod local;
pub mod remote;
pub mod traits;

// Re-export
pub use document::{DocumentStore, MemoryDocumentStore};
pub use firestore::{FirebaseAuth, FirestoreStore};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use traits::{AuthBackend, BackendKind, TaskBackend};
