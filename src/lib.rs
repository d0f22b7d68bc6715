#![allow(async_fn_in_trait)]
pub mod batch;
pub mod classification;
pub mod collection;
pub mod config;
pub mod error;
pub mod extensions;
pub mod geotiff;
pub mod href_format;
pub mod identity;
pub mod item;
pub mod media_type;
pub mod projection;
pub mod range_reader;
mod s3;
pub mod schema;
pub mod stac_operations;

#[cfg(test)]
mod testing;

pub use collection::{CollectionBuilder, CollectionKind};
pub use error::{Error, Result};
pub use item::ItemBuilder;
