//! # apr-changeset
//!
//! Output model of an access-policy evaluation.
//!
//! An [`AccountProfileChanges`] lists the accounts to request, provision,
//! enable, disable, revoke and modify for one identity. Existing accounts
//! carry an [`AccountChange`] with account-attribute updates, parent form
//! defaults and child-table ([`ChildTableRecord`]) operations.

pub mod account_change;
pub mod error;
pub mod field;
pub mod profile_changes;
pub mod record;

pub use account_change::{
    AccountChange, ParentDataChange, PolicyKeyChange, ProvisioningMechanism, UserAccountUpdate,
};
pub use error::ChangeSetError;
pub use field::{parse_date, FieldType, FieldValue};
pub use profile_changes::{AccountBucket, AccountProfileChanges, ChangeCounts};
pub use record::{form_key_name, ChildAction, ChildTableRecord, ACCOUNT_FOREIGN_KEY};
