//! Annotation store for hosted user annotations
//!
//! Users, datasets and the annotation arrays linking them live in a relational
//! database reached through SeaORM. The database URL normally comes from a
//! dataset's `user_annotations.hosted_tiledb_array.db_uri` option.

pub mod config;
pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repositories;

pub use config::DatabaseConfig;
pub use connection::{create_db, DatabaseError, DbSessionMaker};
pub use migrations::Migrator;
pub use repositories::AnnotationRepository;
