// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity and authorization for the secure value store.
//!
//! - [`Identity`]: the authenticated caller, injected by the (external)
//!   authentication layer
//! - [`RequestContext`]: identity plus cancellation and deadline for one call
//! - [`Authorizer`]: the pluggable gate consulted for every capability
//! - [`AllowAllAuthorizer`] and [`PolicyAuthorizer`]: the two bundled gates

pub mod authorizer;
pub mod context;
pub mod error;
pub mod identity;
pub mod policy;

pub use authorizer::{AllowAllAuthorizer, Authorizer, Capability, ResourceAttrs};
pub use context::{Interrupted, RequestContext};
pub use error::{AuthError, AuthResult};
pub use identity::{Identity, NamespaceGrant, NamespaceRole};
pub use policy::{is_allowed, PolicyAuthorizer};
