//! # apr-policy
//!
//! Policy model for access-policy reconciliation.
//!
//! Classifies every (policy, object) pair applicable to an identity and
//! folds the results into a [`PolicyProfile`]: which objects the identity
//! may hold, which policy holds each of them, and which objects are denied.
//! The crate performs no I/O; callers feed it the policy data they read.
//!
//! ## Key invariants
//!
//! - **Deny wins**: an object denied by any applicable policy is never allowed.
//! - **Priority decides holders**: a lower ranked priority displaces a higher
//!   one; an unconditioned policy never displaces anything.
//! - **Actions only escalate**: merging `NONE`, `REVOKE` and `DISABLE` across
//!   competing policies keeps the strongest.

pub mod action;
pub mod builder;
pub mod classifier;
pub mod details;
pub mod diff;
pub mod error;
pub mod priority;
pub mod profile;

pub use action::{ObjAction, ProvisioningOption};
pub use builder::PolicyProfileBuilder;
pub use classifier::{Classification, PolicyObjectClassifier};
pub use details::{PolicyDefinition, PolicyObjectDetails, PolicyObjectGrant, SupplementalPolicy};
pub use diff::{policies_no_longer_applicable, InapplicablePolicy};
pub use error::PolicyError;
pub use priority::Priority;
pub use profile::{PolicyObjectLists, PolicyProfile, StoredProfile};
