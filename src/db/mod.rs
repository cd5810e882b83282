pub mod connection;
pub mod schema;
pub mod store;
pub mod queries;

pub use connection::*;
pub use store::ProjectStore;
pub use queries::SurrealStore;
