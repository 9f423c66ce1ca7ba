pub mod client;
pub mod types;

pub use client::{ConversionService, GrinClient, GrinError};
pub use types::{ConversionInfo, ConversionRecord, CONVERSION_EVENTS};
