//! In-memory books service speaking XML and JSON.
//!
//! # Design
//! Routes:
//!
//! - `/books`, `/books.xml`, `/books.json`: list (GET, filtered by `author`
//!   and `title`, paged by `limit`/`offset`, sorted by `order`) and create
//!   (POST).
//! - `/books/{id}`: show, update and delete; `id` may carry an extension
//!   (`/books/1.json`).
//! - `/status/{code}`: answers any method with the given status.
//! - `/echo`: reflects method, headers, query and body as JSON.
//!
//! The response format comes from the path extension, then the `Accept`
//! header, and defaults to XML. Request bodies are decoded by `Content-Type`.

pub mod codec;

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub use codec::{Book, BookInput, Format};

#[derive(Debug, Default)]
pub struct Store {
    books: BTreeMap<i64, Book>,
    next_id: i64,
}

impl Store {
    fn allocate_id(&mut self, requested: Option<i64>) -> i64 {
        match requested {
            Some(id) if !self.books.contains_key(&id) => {
                self.next_id = self.next_id.max(id);
                id
            }
            _ => {
                self.next_id += 1;
                while self.books.contains_key(&self.next_id) {
                    self.next_id += 1;
                }
                self.next_id
            }
        }
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books.xml", get(list_books).post(create_book))
        .route("/books.json", get(list_books).post(create_book))
        .route(
            "/books/{id}",
            get(show_book).put(update_book).delete(delete_book),
        )
        .route("/status/{code}", any(status))
        .route("/echo", any(echo))
        .layer(middleware::from_fn(log_request))
        .with_state(db)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    debug!(%method, %path, status = response.status().as_u16(), "served request");
    response
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub author: Option<String>,
    pub title: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: Option<String>,
}

/// Split `1.json` into `("1", Some(Json))`. Unknown extensions stay part of
/// the stem.
fn split_extension(segment: &str) -> (&str, Option<Format>) {
    match segment.rsplit_once('.') {
        Some((stem, ext)) => match Format::from_extension(ext) {
            Some(format) => (stem, Some(format)),
            None => (segment, None),
        },
        None => (segment, None),
    }
}

fn response_format(path: &str, headers: &HeaderMap) -> Format {
    let last = path.rsplit('/').next().unwrap_or_default();
    split_extension(last).1.unwrap_or_else(|| {
        Format::from_media_type(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
    })
}

fn body_format(headers: &HeaderMap) -> Format {
    Format::from_media_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

fn render(format: Format, status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, format.mime_type())], body).into_response()
}

fn parse_id(segment: &str) -> Result<i64, StatusCode> {
    split_extension(segment)
        .0
        .parse()
        .map_err(|_| StatusCode::NOT_FOUND)
}

fn sort_books(books: &mut [Book], order: &str) {
    for term in order.split(',').rev() {
        let (field, descending) = match term.rsplit_once('.') {
            Some((field, "desc")) => (field, true),
            Some((field, _)) => (field, false),
            None => (term, false),
        };
        books.sort_by(|a, b| {
            let ordering = match field {
                "id" => a.id.cmp(&b.id),
                "title" => a.title.cmp(&b.title),
                "author" => a.author.cmp(&b.author),
                "pages" => a.pages.cmp(&b.pages),
                _ => std::cmp::Ordering::Equal,
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

async fn list_books(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let format = response_format(uri.path(), &headers);
    let store = db.read().await;

    let mut books: Vec<Book> = store
        .books
        .values()
        .filter(|b| params.author.is_none() || b.author == params.author)
        .filter(|b| params.title.is_none() || params.title.as_ref() == Some(&b.title))
        .cloned()
        .collect();
    if let Some(order) = &params.order {
        sort_books(&mut books, order);
    }
    let books: Vec<Book> = books
        .into_iter()
        .skip(params.offset.unwrap_or(0))
        .take(params.limit.unwrap_or(usize::MAX))
        .collect();

    debug!(count = books.len(), ?format, "listing books");
    render(format, StatusCode::OK, codec::encode_books(format, &books))
}

async fn create_book(
    State(db): State<Db>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let format = response_format(uri.path(), &headers);
    let input = match codec::decode_input(body_format(&headers), &body) {
        Ok(input) => input,
        Err(err) => {
            debug!(%err, "rejecting malformed book");
            return render(
                format,
                StatusCode::BAD_REQUEST,
                codec::encode_errors(format, &[err.0.as_str()]),
            );
        }
    };
    let Some(title) = input.title.filter(|t| !t.trim().is_empty()) else {
        return render(
            format,
            StatusCode::UNPROCESSABLE_ENTITY,
            codec::encode_errors(format, &["title can't be blank"]),
        );
    };

    let mut store = db.write().await;
    let id = store.allocate_id(input.id);
    let book = Book {
        id,
        title,
        author: input.author,
        pages: input.pages,
        in_print: input.in_print,
    };
    store.books.insert(id, book.clone());
    info!(id, "created book");
    render(format, StatusCode::CREATED, codec::encode_book(format, &book))
}

async fn show_book(
    State(db): State<Db>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let format = response_format(&segment, &headers);
    let id = parse_id(&segment)?;
    let store = db.read().await;
    let book = store.books.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(render(format, StatusCode::OK, codec::encode_book(format, book)))
}

async fn update_book(
    State(db): State<Db>,
    Path(segment): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, StatusCode> {
    let format = response_format(&segment, &headers);
    let id = parse_id(&segment)?;
    let input = codec::decode_input(body_format(&headers), &body)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let mut store = db.write().await;
    let book = store.books.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(title) = input.title {
        book.title = title;
    }
    if input.author.is_some() {
        book.author = input.author;
    }
    if input.pages.is_some() {
        book.pages = input.pages;
    }
    if input.in_print.is_some() {
        book.in_print = input.in_print;
    }
    info!(id, "updated book");
    Ok(render(format, StatusCode::OK, codec::encode_book(format, book)))
}

async fn delete_book(
    State(db): State<Db>,
    Path(segment): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let id = parse_id(&segment)?;
    let mut store = db.write().await;
    store
        .books
        .remove(&id)
        .map(|_| {
            info!(id, "deleted book");
            StatusCode::NO_CONTENT
        })
        .ok_or(StatusCode::NOT_FOUND)
}

async fn status(Path(code): Path<u16>) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if status.is_redirection() {
        return (status, [(header::LOCATION, "/books")]).into_response();
    }
    status.into_response()
}

async fn echo(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Json<serde_json::Value> {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "authorization": header_value(header::AUTHORIZATION),
        "content_type": header_value(header::CONTENT_TYPE),
        "accept": header_value(header::ACCEPT),
        "body": body,
    }))
}
