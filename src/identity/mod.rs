//! Identity, role resolution and access gating.
//! The external identity provider and role store sit behind traits; session resolution and the
//! route guard only ever talk to those seams.

mod principal;
mod provider;
mod store;
pub mod toolkit;
pub mod documents;
pub mod memory;
pub mod session;
pub mod guard;

pub use principal::{Principal, Role};
pub use provider::{AuthChannel, AuthStream, IdentityProvider, ProvisioningSession};
pub use store::{resolve_role, MemoryRoleStore, RefreshingRoleStore, RoleStore};
pub use session::{SessionResolver, SessionState};
pub use guard::{Capabilities, GuardDecision, Page, Redirect, RouteGuard};
