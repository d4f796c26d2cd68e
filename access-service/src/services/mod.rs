pub mod auth;
pub mod bootstrap;
pub mod database;
pub mod domain_switch;
pub mod error;
pub mod memory;
pub mod policy;
pub mod session;
pub mod store;

pub use auth::{Authenticator, RouteClass};
pub use database::Database;
pub use domain_switch::DomainSwitch;
pub use error::ServiceError;
pub use memory::MemoryStore;
pub use policy::PolicyAggregator;
pub use session::SessionRegistry;
pub use store::{DirectoryStore, PolicySource};
