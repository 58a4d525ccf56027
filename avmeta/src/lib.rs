pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod filter;
pub mod media;
pub mod naming;
pub mod record;
pub mod schema;
pub mod search;
pub mod store;
pub mod validation;

pub use config::{Config, OnConflict};
pub use error::{AvMetaError, Result};
pub use filter::{FilterCriterion, MatchMode, Query};
pub use media::MediaType;
pub use record::Record;
pub use schema::{FieldRef, Schema, SchemaSet};
pub use search::{SearchReport, SearchResult};
pub use store::Store;
