//! Domain types for operations and credentials

pub mod credentials;
pub mod graphql;
pub mod operation;

pub use credentials::{CredentialPair, RefreshResponse};
pub use graphql::{GraphQLError, GraphQLRequest, GraphQLResponse, UNAUTHENTICATED_CODE};
pub use operation::{Operation, OperationKind};
