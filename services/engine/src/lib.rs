pub mod adapters;
pub mod config;
pub mod error;
pub mod session;
pub mod stores;
pub mod sync;

// Re-export the session entry point and the types an embedding host needs
// to drive the engine.
pub use config::Config;
pub use error::{CommandError, EngineError};
pub use session::EngineSession;
pub use stores::StoreRegistry;
pub use sync::{Notification, SendOutcome};
