//! # apr-store
//!
//! Interfaces to the data an access-policy evaluation reads and writes:
//! policies and their form defaults, identities and their accounts, form
//! metadata, and the per-identity policy profile with its history.
//!
//! Two backends ship with the crate: [`InMemoryStore`] implements every
//! interface (seeded programmatically or from a [`Fixture`]), and
//! [`JsonProfileStore`] keeps profiles as JSON files on disk.

pub mod error;
pub mod filter;
pub mod fixture;
pub mod json_store;
pub mod memory;
pub mod records;
pub mod repository;

pub use error::{Result, StoreError};
pub use filter::{EqualityFilter, ParameterizedQuery, SqlDialect, SqlParam};
pub use fixture::{
    AccountEntry, ChildDefaultEntry, Fixture, FormEntry, IdentityEntry, ParentDefaultEntry,
    PolicyEntry, RowEntry,
};
pub use json_store::JsonProfileStore;
pub use memory::InMemoryStore;
pub use records::{
    AccountStatus, AccountType, ChildFormDefault, FormField, FormRow, ParentFormDefault,
    ProvisionedAccount,
};
pub use repository::{AccountRepository, FormCatalog, PolicyRepository, ProfileSnapshot, ProfileStore};
