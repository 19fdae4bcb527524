//! Document-database access: the collaborator trait, the MongoDB driver
//! wrapper and JSON/BSON conversion.

pub mod collaborator;
pub mod convert;
pub mod mongo;

pub use collaborator::{CollectionMetadata, DbFuture, DocumentDatabase, IndexSpec, Stage};
pub use mongo::{MongoDatabase, Reported, usable_collections};
