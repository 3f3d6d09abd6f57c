pub mod db;
pub mod jobs;
pub mod schema;
pub mod store;

pub use store::JobStore;
