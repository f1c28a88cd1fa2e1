//! Social-graph store and compatibility ranking for the study buddy service.
//!
//! [`store::Store`] owns the user directory and the friendship graph over an
//! injectable [`store::Backend`]; [`ranker`] scores users against each other;
//! [`routes`] puts it all behind HTTP.

pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod graph;
pub mod importer;
pub mod ranker;
pub mod routes;
pub mod store;

pub use error::{CoreError, CoreResult, StorageError};
pub use routes::{app, State};
pub use store::{Backend, MemoryBackend, SledBackend, Store};
