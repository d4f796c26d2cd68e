pub mod directory;
pub mod domain;
pub mod lookup;
pub mod policy;
pub mod principal;
pub mod session;
pub mod status;

pub use directory::{App, Grant, GrantSubject, Group, GroupGrant, UserGrant};
pub use domain::{select_working_domain, Domain};
pub use lookup::{Lookup, LookupError};
pub use policy::{Policy, PolicyApp, PolicyNode, PolicyRow};
pub use principal::{
    Identity, NetworkIdentity, NewPrincipal, Principal, PrincipalKind, PrincipalRow,
    PrincipalUpdate, Role,
};
pub use session::{AuthContext, Session, SessionRow, SessionToken};
pub use status::RecordStatus;
