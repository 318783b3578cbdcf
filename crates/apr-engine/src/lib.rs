//! # apr-engine
//!
//! Access-policy evaluation for one identity at a time.
//!
//! [`PolicyEvaluator`] reads the identity's applicable policies, builds its
//! policy profile, stores that profile (archiving the previous one), and
//! compiles an [`AccountProfileChanges`](apr_changeset::AccountProfileChanges)
//! describing every account to request, provision, enable, disable, revoke or
//! modify. Child-form entitlements are reconciled by [`ChildDataReconciler`].
//!
//! All data access goes through the `apr-store` traits; see
//! [`Collaborators`].

pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod persist;
pub mod reconciler;

pub use compiler::AccountChangeCompiler;
pub use config::{EngineConfig, EntitlementConfig, HarvestingConfig, ProvisioningConfig, WindowCheck};
pub use context::{Collaborators, PolicyObjects};
pub use error::{EvaluationError, Result};
pub use evaluator::{EvaluationOutcome, PolicyEvaluator, SkipReason};
pub use persist::{PersistOutcome, ProfilePersister};
pub use reconciler::{AccountTarget, ChildDataReconciler, LogicalRecord};
