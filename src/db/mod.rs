pub mod dbclient;
pub mod model;
pub mod schema;

pub use dbclient::DBClient;
