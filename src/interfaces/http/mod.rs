//! HTTP tool API
//!
//! - `common`: response envelope, error mapping, validated JSON extractor
//! - `middleware`: bearer API key authentication
//! - `modules`: handlers grouped by resource, plus request-id and metrics middleware
//! - `router`: router assembly and OpenAPI document

pub mod common;
pub mod middleware;
pub mod modules;
pub mod router;

pub use router::{create_api_router, ApiDoc, AppState};
