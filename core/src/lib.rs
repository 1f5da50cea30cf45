//! Data-access adapter for resources exposed over REST.
//!
//! # Overview
//! Records described by a [`Schema`] are read and written through a remote
//! HTTP service that speaks XML or JSON. A [`Query`] is translated either to
//! a direct resource fetch (`GET /books/1`) or a collection fetch with
//! request parameters (`GET /books?author=Ann&limit=10&offset=0`), and the
//! results are re-filtered client-side.
//!
//! # Design
//! - The network sits behind the [`Transport`] trait. [`UreqTransport`] is
//!   the blocking implementation; tests script responses instead.
//! - [`Connection`] owns the frozen [`Endpoint`] and the [`Format`], derives
//!   one URL per request and classifies every response status into `Ok` or
//!   a typed [`Error`].
//! - [`RestAdapter`] runs create/read/update/delete one request per record,
//!   in order, and lets the first error abort the batch.
//! - Codecs return plain [`AttributeMap`]s so parsing stays independent of
//!   records and connections.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod format;
pub mod http;
pub mod mapper;
pub mod query;
pub mod record;
pub mod schema;

pub use adapter::RestAdapter;
pub use config::AdapterConfig;
pub use connection::{classify_response, Connection, RequestBody};
pub use endpoint::{Endpoint, Params};
pub use error::{Error, Result};
pub use format::Format;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use mapper::ResourceMapper;
pub use query::{Comparison, Condition, Direction, Operator, Order, Query, ReadPlan};
pub use record::Record;
pub use schema::{AttributeMap, Property, PropertyType, Schema, Value};
