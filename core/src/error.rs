//! Error types for the REST adapter.
//!
//! # Design
//! Errors are grouped by where they originate:
//! - usage errors are raised synchronously, before any network I/O;
//! - HTTP-outcome errors map one-to-one onto the status-code table used by
//!   the connection and carry the raw response for inspection;
//! - parse errors come from the format codecs;
//! - transport errors are I/O failures below HTTP.
//!
//! `ResourceNotFound` is the only outcome the adapter ever downgrades, and
//! only on a single-resource read.

use crate::http::{HttpMethod, HttpResponse};
use crate::schema::PropertyType;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the connection, the codecs and the adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- usage --------------------------------------------------------------
    /// A body was supplied to a GET or HEAD request.
    #[error("Cannot send request body with a {method} request")]
    BodyNotAllowed { method: HttpMethod },

    /// Query parameters were supplied to a POST, PUT or DELETE request.
    #[error("Cannot send params with a {method} request")]
    ParamsNotAllowed { method: HttpMethod },

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// A record was given a field its schema does not declare.
    #[error("unknown field `{field}` on {resource}")]
    UnknownField { resource: String, field: String },

    /// A write was attempted on a record whose key is not set.
    #[error("{resource} has no key value")]
    MissingKey { resource: String },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // -- HTTP outcome -------------------------------------------------------
    #[error("redirected with status {}", .0.status)]
    Redirection(HttpResponse),

    #[error("bad request")]
    BadRequest(HttpResponse),

    #[error("unauthorized access")]
    UnauthorizedAccess(HttpResponse),

    #[error("forbidden access")]
    ForbiddenAccess(HttpResponse),

    #[error("resource not found")]
    ResourceNotFound(HttpResponse),

    #[error("method not allowed")]
    MethodNotAllowed(HttpResponse),

    #[error("resource conflict")]
    ResourceConflict(HttpResponse),

    /// The server rejected the record (422). Field errors are left in the body.
    #[error("resource invalid")]
    ResourceInvalid(HttpResponse),

    #[error("client error with status {}", .0.status)]
    ClientError(HttpResponse),

    #[error("server error with status {}", .0.status)]
    ServerError(HttpResponse),

    #[error("{message}")]
    ConnectionError {
        response: HttpResponse,
        message: String,
    },

    // -- parse --------------------------------------------------------------
    /// The payload had no root element or object for the expected resource.
    #[error("No root element matching {resource}")]
    MissingRoot { resource: String },

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A wire value could not be converted into the property's type.
    #[error("cannot typecast `{value}` for `{field}` as {kind}")]
    Typecast {
        field: String,
        kind: PropertyType,
        value: String,
    },

    // -- transport ----------------------------------------------------------
    #[error("transport failure: {0}")]
    Transport(String),
}

impl Error {
    /// The raw response carried by an HTTP-outcome error.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Error::Redirection(r)
            | Error::BadRequest(r)
            | Error::UnauthorizedAccess(r)
            | Error::ForbiddenAccess(r)
            | Error::ResourceNotFound(r)
            | Error::MethodNotAllowed(r)
            | Error::ResourceConflict(r)
            | Error::ResourceInvalid(r)
            | Error::ClientError(r)
            | Error::ServerError(r)
            | Error::ConnectionError { response: r, .. } => Some(r),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound(_))
    }

    /// True for errors reported before any request was sent.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::BodyNotAllowed { .. }
                | Error::ParamsNotAllowed { .. }
                | Error::UnknownFormat(_)
                | Error::UnknownField { .. }
                | Error::MissingKey { .. }
                | Error::InvalidEndpoint(_)
        )
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.to_string())
    }
}
