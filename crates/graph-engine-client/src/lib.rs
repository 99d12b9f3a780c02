//! Graph Engine Client: connection layer for remote graph analytics engines
//!
//! Provides two connection implementations:
//!
//! - **`ManagedConnection`**: engines are provisioned on demand through a
//!   control plane and billed for deployment plus runtime.
//!
//! - **`SelfManagedConnection`**: a pre-existing engine at a fixed endpoint.
//!   No deployment step and no cost.
//!
//! Both implement the `EngineConnection` trait. Stored results are read back
//! through the separate `ResultReader` trait (`DatabaseResultReader`).
//!
//! # Quick Start
//!
//! ```no_run
//! use graph_engine_client::{EngineConnection, EngineSize, LoadGraphRequest, SelfManagedConnection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let conn = SelfManagedConnection::new("http://localhost:8829", None).unwrap();
//!     let engine = conn.deploy_engine(EngineSize::Small).await.unwrap();
//!
//!     let request = LoadGraphRequest::collections("shop", ["users"], ["follows"]);
//!     let graph = conn.load_graph(&engine, &request).await.unwrap();
//!     println!("Loaded {} vertices", graph.vertex_count);
//! }
//! ```

pub mod connection;
pub mod error;
pub mod http;
pub mod managed;
pub mod models;
pub mod results;
pub mod self_managed;

mod engine_api;

pub use connection::EngineConnection;
pub use error::{EngineError, EngineResult};
pub use managed::ManagedConnection;
pub use models::{
    AlgorithmKind, DeploymentMode, EngineHandle, EngineSize, GraphInfo, JobHandle, JobStatus,
    LoadGraphRequest, NamedGraph, ResultDocument, StoreOutcome, StoreResultsRequest,
};
pub use results::{DatabaseResultReader, ResultReader};
pub use self_managed::SelfManagedConnection;
