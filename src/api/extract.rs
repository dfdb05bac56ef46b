//! `Json` and `Query` extractors whose rejections answer like every other client error.
use axum::extract::{FromRequest, FromRequestParts, Query};

use crate::error::ServiceError;

/// A JSON body. Malformed or mistyped bodies become a 422 with a `detail` message.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct ApiJson<T>(pub T);

/// A query string, rejected the same way as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ServiceError))]
pub struct ApiQuery<T>(pub T);
