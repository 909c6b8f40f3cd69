//! Data Transfer Objects for REST request/response serialization.
//!
//! Timestamps are ISO-8601 strings; identifiers are UUID strings.

pub mod common_dto;
pub mod monitor_dto;
pub mod ping_dto;

pub use common_dto::*;
pub use monitor_dto::*;
pub use ping_dto::*;
