pub mod api;
pub mod query;
pub mod writer;

pub use query::CuratedQuery;
pub use writer::{CuratedError, CuratedRecord, CuratedStore};
