//! HTTP handlers. Every handler behind the gate receives the caller's
//! `AuthContext`.

pub mod access;
pub mod domain;
pub mod policy;
pub mod session;
pub mod user;

pub use access::*;
pub use domain::*;
pub use policy::*;
pub use session::*;
pub use user::*;
