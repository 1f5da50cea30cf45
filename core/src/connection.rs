//! Request dispatch and response classification.
//!
//! # Design
//! A `Connection` owns a frozen [`Endpoint`], the chosen [`Format`] and a
//! [`Transport`]. Every call goes through [`Connection::send`]:
//!
//! 1. `build_request` validates the verb/body pairing, derives the request
//!    URL from a copy of the endpoint and attaches format and auth headers.
//!    Misuse is reported here, before any I/O.
//! 2. The transport executes the request.
//! 3. [`classify_response`] turns the status code into either the raw
//!    response or a typed error.
//!
//! Nothing is retried, cached or shared mutably between calls.

use base64::prelude::*;
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Params};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};

/// What accompanies a request: nothing, query parameters (GET/HEAD only) or
/// a literal body (POST/PUT/DELETE only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody<'a> {
    Empty,
    Params(&'a Params),
    Data(&'a str),
}

/// Blocking HTTP connection to one endpoint.
#[derive(Debug, Clone)]
pub struct Connection<T = UreqTransport> {
    endpoint: Endpoint,
    format: Format,
    use_extension: bool,
    transport: T,
}

impl Connection<UreqTransport> {
    /// Fails fast when `format` names no known codec.
    pub fn new(endpoint: Endpoint, format: &str, use_extension: bool) -> Result<Self> {
        let format = format.parse::<Format>()?;
        Ok(Self::with_transport(
            endpoint,
            format,
            use_extension,
            UreqTransport::new(),
        ))
    }
}

impl<T: Transport> Connection<T> {
    pub fn with_transport(
        endpoint: Endpoint,
        format: Format,
        use_extension: bool,
        transport: T,
    ) -> Self {
        Self {
            endpoint,
            format,
            use_extension,
            transport,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Whether `.{extension}` is appended to request paths.
    pub fn use_extension(&self) -> bool {
        self.use_extension
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn http_get(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.send(HttpMethod::Get, path, params.map_or(RequestBody::Empty, RequestBody::Params))
    }

    pub fn http_head(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.send(HttpMethod::Head, path, params.map_or(RequestBody::Empty, RequestBody::Params))
    }

    pub fn http_post(&self, path: &str, body: Option<&str>) -> Result<HttpResponse> {
        self.send(HttpMethod::Post, path, body.map_or(RequestBody::Empty, RequestBody::Data))
    }

    pub fn http_put(&self, path: &str, body: Option<&str>) -> Result<HttpResponse> {
        self.send(HttpMethod::Put, path, body.map_or(RequestBody::Empty, RequestBody::Data))
    }

    pub fn http_delete(&self, path: &str, body: Option<&str>) -> Result<HttpResponse> {
        self.send(HttpMethod::Delete, path, body.map_or(RequestBody::Empty, RequestBody::Data))
    }

    /// Build, execute and classify one request.
    pub fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody<'_>,
    ) -> Result<HttpResponse> {
        let request = self.build_request(method, path, body)?;
        debug!(method = %request.method, url = %request.url, "sending request");

        let response = self.transport.execute(&request)?;
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "received response"
        );

        classify_response(response).inspect_err(|err| {
            warn!(method = %request.method, url = %request.url, error = %err, "request failed");
        })
    }

    /// Describe the request `send` would execute, without executing it.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody<'_>,
    ) -> Result<HttpRequest> {
        let (params, data) = match body {
            RequestBody::Empty => (None, None),
            RequestBody::Params(p) if p.is_empty() => (None, None),
            RequestBody::Data(d) if d.is_empty() => (None, None),
            RequestBody::Params(p) if method.takes_params() => (Some(p), None),
            RequestBody::Params(_) => return Err(Error::ParamsNotAllowed { method }),
            RequestBody::Data(d) if !method.takes_params() => (None, Some(d.to_string())),
            RequestBody::Data(_) => return Err(Error::BodyNotAllowed { method }),
        };

        let extension = self.use_extension.then(|| self.format.extension());
        let url = self.endpoint.request_url(path, extension, params)?;

        let mut headers: Vec<(String, String)> = self
            .format
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some((user, password)) = self.endpoint.credentials() {
            let token = BASE64_STANDARD.encode(format!("{user}:{password}"));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body: data,
        })
    }
}

/// Map a status code onto the outcome table: 2xx and 3xx pass through except
/// 301/302; every other code becomes its typed error.
pub fn classify_response(response: HttpResponse) -> Result<HttpResponse> {
    match response.status {
        301 | 302 => Err(Error::Redirection(response)),
        200..=399 => Ok(response),
        400 => Err(Error::BadRequest(response)),
        401 => Err(Error::UnauthorizedAccess(response)),
        403 => Err(Error::ForbiddenAccess(response)),
        404 => Err(Error::ResourceNotFound(response)),
        405 => Err(Error::MethodNotAllowed(response)),
        409 => Err(Error::ResourceConflict(response)),
        422 => Err(Error::ResourceInvalid(response)),
        406..=499 => Err(Error::ClientError(response)),
        500..=599 => Err(Error::ServerError(response)),
        status => Err(Error::ConnectionError {
            response,
            message: format!("Unknown response code: {status}"),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Transport that records requests and replays canned responses.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<HttpResponse>>,
    }

    impl ScriptedTransport {
        pub(crate) fn reply(&self, status: u16, body: &str) -> &Self {
            self.responses.lock().unwrap().push_back(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            });
            self
        }

        pub(crate) fn sent(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Transport("no scripted response".to_string()))
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("localhost")
            .with_port(4000)
            .with_credentials("admin", "secret")
    }

    fn connection(use_extension: bool) -> Connection<ScriptedTransport> {
        Connection::with_transport(
            endpoint(),
            Format::Xml,
            use_extension,
            ScriptedTransport::default(),
        )
    }

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn new_rejects_unknown_formats() {
        let err = Connection::new(endpoint(), "yaml", false).unwrap_err();
        assert!(matches!(err, Error::UnknownFormat(ref name) if name == "yaml"));

        let conn = Connection::new(endpoint(), "json", true).unwrap();
        assert_eq!(conn.format(), Format::Json);
        assert!(conn.use_extension());
        assert_eq!(conn.endpoint().credentials(), Some(("admin", "secret")));
    }

    // -----------------------------------------------------------------------
    // Request building
    // -----------------------------------------------------------------------

    #[test]
    fn get_like_requests_carry_headers_and_no_body() {
        for method in [HttpMethod::Get, HttpMethod::Head] {
            let req = connection(false)
                .build_request(method, "foobars", RequestBody::Empty)
                .unwrap();
            assert_eq!(req.method, method);
            assert_eq!(req.url, "http://localhost:4000/foobars");
            assert_eq!(req.header("Content-Type"), Some("application/xml"));
            assert_eq!(req.header("Accept"), Some("application/xml"));
            assert_eq!(req.header("Authorization"), Some("Basic YWRtaW46c2VjcmV0"));
            assert!(req.body.is_none());
        }
    }

    #[test]
    fn get_like_requests_merge_params() {
        let conn = Connection::with_transport(
            endpoint().with_query_param("baz", "no"),
            Format::Xml,
            false,
            ScriptedTransport::default(),
        );
        let params: Params = [("widget", "yes")].into_iter().collect();
        let req = conn
            .build_request(HttpMethod::Head, "foobars", RequestBody::Params(&params))
            .unwrap();
        assert_eq!(req.url, "http://localhost:4000/foobars?baz=no&widget=yes");

        let req = conn
            .build_request(HttpMethod::Get, "foobars", RequestBody::Empty)
            .unwrap();
        assert_eq!(req.url, "http://localhost:4000/foobars?baz=no");
    }

    #[test]
    fn extension_is_appended_before_params() {
        let params: Params = [("widget", "yes")].into_iter().collect();
        let req = connection(true)
            .build_request(HttpMethod::Get, "foobars", RequestBody::Params(&params))
            .unwrap();
        assert_eq!(req.url, "http://localhost:4000/foobars.xml?widget=yes");
    }

    #[test]
    fn body_on_get_like_request_is_a_usage_error() {
        for method in [HttpMethod::Get, HttpMethod::Head] {
            let conn = connection(false);
            let err = conn
                .send(method, "foobars", RequestBody::Data("<data>"))
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Cannot send request body with a {method} request")
            );
            assert!(conn.transport().sent().is_empty());
        }
    }

    #[test]
    fn params_on_post_like_request_is_a_usage_error() {
        let params: Params = [("widget", "yes")].into_iter().collect();
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete] {
            let conn = connection(false);
            let err = conn
                .send(method, "foobars", RequestBody::Params(&params))
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Cannot send params with a {method} request")
            );
            assert!(conn.transport().sent().is_empty());
        }
    }

    #[test]
    fn empty_bodies_and_params_are_ignored() {
        let req = connection(false)
            .build_request(HttpMethod::Get, "foobars", RequestBody::Data(""))
            .unwrap();
        assert!(req.body.is_none());

        let req = connection(false)
            .build_request(HttpMethod::Post, "foobars", RequestBody::Params(&Params::new()))
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn post_like_requests_send_the_body() {
        let conn = Connection::with_transport(
            endpoint().with_query_param("baz", "no"),
            Format::Json,
            true,
            ScriptedTransport::default(),
        );
        conn.transport().reply(201, "");
        conn.http_put("foobars", Some("<data>")).unwrap();

        let sent = conn.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Put);
        assert_eq!(sent[0].url, "http://localhost:4000/foobars.json?baz=no");
        assert_eq!(sent[0].body.as_deref(), Some("<data>"));
        assert_eq!(sent[0].header("content-type"), Some("application/json"));
    }

    #[test]
    fn no_auth_header_without_credentials() {
        let conn = Connection::with_transport(
            Endpoint::new("localhost"),
            Format::Xml,
            false,
            ScriptedTransport::default(),
        );
        let req = conn
            .build_request(HttpMethod::Delete, "books/1", RequestBody::Empty)
            .unwrap();
        assert!(req.header("Authorization").is_none());
        assert_eq!(req.url, "http://localhost/books/1");
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[test]
    fn success_codes_pass_through_unchanged() {
        for status in [200, 201, 204, 299, 300, 303, 304, 399] {
            let resp = classify_response(response(status)).unwrap();
            assert_eq!(resp, response(status));
        }
    }

    #[test]
    fn error_codes_map_to_their_kind() {
        let cases: &[(u16, fn(&Error) -> bool)] = &[
            (301, |e| matches!(e, Error::Redirection(_))),
            (302, |e| matches!(e, Error::Redirection(_))),
            (400, |e| matches!(e, Error::BadRequest(_))),
            (401, |e| matches!(e, Error::UnauthorizedAccess(_))),
            (403, |e| matches!(e, Error::ForbiddenAccess(_))),
            (404, |e| matches!(e, Error::ResourceNotFound(_))),
            (405, |e| matches!(e, Error::MethodNotAllowed(_))),
            (406, |e| matches!(e, Error::ClientError(_))),
            (409, |e| matches!(e, Error::ResourceConflict(_))),
            (410, |e| matches!(e, Error::ClientError(_))),
            (422, |e| matches!(e, Error::ResourceInvalid(_))),
            (499, |e| matches!(e, Error::ClientError(_))),
            (500, |e| matches!(e, Error::ServerError(_))),
            (599, |e| matches!(e, Error::ServerError(_))),
            (402, |e| matches!(e, Error::ConnectionError { .. })),
            (100, |e| matches!(e, Error::ConnectionError { .. })),
            (999, |e| matches!(e, Error::ConnectionError { .. })),
        ];
        for (status, check) in cases {
            let err = classify_response(response(*status)).unwrap_err();
            assert!(check(&err), "{status}: {err:?}");
            assert_eq!(err.response().map(|r| r.status), Some(*status));
        }
    }

    #[test]
    fn unknown_codes_name_the_code() {
        let err = classify_response(response(900)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown response code: 900");
    }

    #[test]
    fn send_returns_classified_outcome() {
        let conn = connection(false);
        conn.transport().reply(200, "<ok/>").reply(503, "down");

        let resp = conn.http_post("test", None).unwrap();
        assert_eq!(resp.body, "<ok/>");

        let err = conn.http_post("test", None).unwrap_err();
        assert!(matches!(err, Error::ServerError(ref r) if r.body == "down"));
    }
}
