//! Converts a Lesis forestry export (DBF attribute tables plus a stand
//! shapefile) into one SQLite spatial database.

pub mod aggregate;
pub mod aliases;
pub mod catalog;
pub mod children;
pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod layout;
pub mod legacy;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod schema;
pub mod shape;

pub use config::ConvertSettings;
pub use error::{ConvertError, RecordError};
pub use pipeline::{ConvertRequest, ConvertResult, Converter, RunReport};
pub use progress::{InterruptHandle, Stage};
