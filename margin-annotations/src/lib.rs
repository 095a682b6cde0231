//! Margin Annotations - named values attached to entities
//!
//! [`Annotation`]s (comments, ratings, likes) and [`Metadata`] share one
//! attribute set, [`ExtenderAttributes`], and one repository addressed by
//! [`ExtenderKind`]. Both implement [`Persistable`] and [`Accessible`].
//! Deleting an annotation also removes the river items that report on it.
//!
//! Operations take an [`ExtenderServices`] carrying the repository, river,
//! directory lookups, edit policy and the current user.

pub mod annotation;
pub mod capability;
pub mod extender;
pub mod metadata;
pub mod policy;
pub mod repository;
pub mod river;
pub mod services;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use annotation::Annotation;
pub use capability::{Accessible, Extender, Persistable};
pub use extender::{
    AccessLevel, ExtenderAttributes, ExtenderFields, ExtenderId, ExtenderKind, ExtenderRecord,
    ExtenderValue, ValueType,
};
pub use metadata::Metadata;
pub use policy::{AccessPolicy, DefaultAccessPolicy};
pub use repository::{ExtenderRepository, MemoryExtenderRepository};
pub use river::{MemoryRiverStore, RiverEntry, RiverFilter, RiverStore};
pub use services::{Anonymous, ExtenderServices};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteExtenderRepository, SqliteRiverStore};
