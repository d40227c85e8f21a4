//! Central identity and session state for the marketplace client.
//! Keep the public surface thin and split implementation across sub-modules.

mod authorizer;
mod principal;
mod provider;
mod resolver;
mod rest;
mod session;

pub use authorizer::{can_access, decide_route, RouteDecision};
pub use principal::{Principal, Role};
pub use provider::{IdentityProvider, LocalIdentityProvider, MemoryProfileStore, ProfileProvider};
pub use resolver::{AuthPhase, ResolvedIdentity, SessionResolver};
pub use rest::RestProfileProvider;
pub use session::{decode_jwt_claims, gen_token, AuthChange, JwtClaims, Session, UserId};
