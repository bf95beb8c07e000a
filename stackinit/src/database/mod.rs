//! Database backends: resolution, embedded schema creation and migration dispatch.

mod migrate;
mod resolver;
mod schema;

pub use migrate::{MigrationDispatcher, native_command};
pub use resolver::{
    CONNECTION_OPTION, DATABASE_SECTION, DatabaseBackend, DatabaseDescriptor, DatabaseResolver,
    ResolvedDatabases,
};
pub use schema::{
    CELL0_UUID, EmbeddedDatabase, NULL_TRANSPORT, SchemaBundle, SchemaOutcome, VERSION_TABLE,
};
