//! Connection and privilege-elevation broker.
//!
//! Given a managed cluster identifier, the broker decides which credentials
//! to use, resolves the cluster, finds the Hive that manages it (possibly in
//! another control-plane environment), and builds standard and elevated
//! Kubernetes clients against both, proving each one works.
//!
//! # Pieces
//!
//! - [`ConnectionBuilder`] opens a [`Connection`] from the environment, an
//!   endpoint file, or a cloned endpoint with a different URL.
//! - [`ClusterLocator`] classifies identifiers with
//!   [`ClusterIdentifierQuery::classify`] and resolves them.
//! - [`HiveDiscovery`] pairs a target with its Hive as a [`HiveLink`].
//! - [`ClientFactory`] builds [`KubeClient`]s, elevated ones through a
//!   reason-scoped [`ElevationRequest`].
//! - [`SessionValidator`] proves a client works.
//! - [`HiveLoginCheck`] runs all of the above in order.
//!
//! The backend is pluggable through [`ControlPlane`]: [`OcmControlPlane`]
//! speaks HTTP and [`FakeControlPlane`] runs in memory.
//!
//! # Example
//!
//! ```rust
//! use hivelink_broker::{ClusterIdentifierQuery, ClusterSearch};
//!
//! let query = ClusterIdentifierQuery::classify("c1f562af-fb22-42c5-aa07-6848e1eeee9c");
//! assert!(matches!(query, ClusterIdentifierQuery::ExternalId(_)));
//! assert_eq!(
//!     query.to_search().to_search_string(),
//!     "(external_id = 'c1f562af-fb22-42c5-aa07-6848e1eeee9c')"
//! );
//! # let _ = ClusterSearch::ApiUrl(String::new());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod connection;
pub mod elevation;
pub mod error;
pub mod factory;
pub mod fake;
pub mod hive;
pub mod http;
pub mod locator;
pub mod run;
pub mod validator;

pub use backend::{
    ClusterRecord, ClusterSearch, ClusterState, ControlPlane, KubeApi, KubeObject, KubeResource,
    ProvisionShard, Session,
};
pub use connection::{BuildMode, Connection, ConnectionBuilder};
pub use elevation::ElevationRequest;
pub use error::{BrokerError, ErrorKind, Result};
pub use factory::{
    ClientFactory, ClientVariant, KubeClient, new_elevated_client, new_elevated_client_for,
    new_standard_client,
};
pub use fake::FakeControlPlane;
pub use hive::{HiveConnection, HiveDiscovery, HiveLink, HiveSource};
pub use http::OcmControlPlane;
pub use locator::{ClusterIdentifierQuery, ClusterLocator};
pub use run::{
    CHECKS, CheckId, CheckOptions, CheckOutcome, ClusterRole, ConnectionKind, HiveLoginCheck,
    NoProgress, Progress, RunError, RunReport, Step,
};
pub use validator::{ElevatedProbe, OperatorStatus, SessionValidator, ValidationReport};
