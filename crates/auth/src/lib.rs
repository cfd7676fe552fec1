//! Authorization context.
//!
//! Resolves bearer tokens into caller identities and checks them against a
//! static operation to role table. Enforcement order is fixed: public bypass,
//! then token and user resolution, then the role check.

pub mod capability;
pub mod error;
pub mod guard;
pub mod password;
pub mod token;

pub use capability::{Access, Operation, access};
pub use error::{AuthError, Result};
pub use guard::{Authorizer, Identity};
pub use password::{hash_password, verify_password};
pub use token::{Claims, IssuedToken, TokenService};
