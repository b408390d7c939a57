pub mod json;
pub mod lock;
pub mod schema;
pub mod snapshot;
pub mod traits;

pub use json::JsonGraphStore;
pub use lock::WriterLock;
pub use snapshot::{GraphDocument, GraphSnapshot};
pub use traits::{EdgeInsert, GraphStore, NodeEdit, NodeUpsert};
