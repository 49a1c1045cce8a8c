//! In-process stand-in for the archive backend, plus a logger that keeps
//! error lines around so tests can check what was reported.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};

use log::{Level, LevelFilter, Metadata, Record};
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::book::Book;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct State {
    books: Vec<Book>,
    next_id: i64,
    requests: Vec<RecordedRequest>,
    canned: Option<(u16, String)>,
    truncate: bool,
}

pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub async fn start() -> FakeBackend {
        init_logger();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            next_id: 1,
            ..State::default()
        }));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        FakeBackend { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Answer every following request with this status and body.
    pub fn respond_with(&self, status: u16, body: &str) {
        self.state.lock().unwrap().canned = Some((status, body.to_string()));
    }

    /// Announce more body bytes than are sent, so reading the body fails.
    pub fn truncate_bodies(&self) {
        self.state.lock().unwrap().truncate = true;
    }
}

/// A URL on which nothing is listening.
pub async fn closed_port_url() -> String {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let request = match read_request(&mut stream).await? {
        Some(request) => request,
        None => return Ok(()),
    };

    let (status, body, missing) = {
        let mut state = state.lock().unwrap();
        state.requests.push(request.clone());
        let (status, body) = match state.canned.clone() {
            Some(canned) => canned,
            None => route(&mut state, &request),
        };
        (status, body, if state.truncate { 64 } else { 0 })
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        body.len() + missing,
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<RecordedRequest>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos;
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            let mut parts = line.splitn(2, ':');
            Some((parts.next()?.trim().to_lowercase(), parts.next()?.trim().to_string()))
        })
        .collect();

    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    }))
}

fn route(state: &mut State, request: &RecordedRequest) -> (u16, String) {
    let url = match Url::parse(&format!("http://backend{}", request.target)) {
        Ok(url) => url,
        Err(_) => return (400, String::new()),
    };
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let segments: Vec<&str> = url.path().trim_start_matches("/api/").split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["books"]) => json(200, &state.books),
        ("GET", ["books", "bygenre"]) => {
            let wanted = query.get("genre").cloned().unwrap_or_default();
            filtered(state, |book| book.genre.as_str() == wanted)
        }
        ("GET", ["books", "byformat"]) => {
            let wanted = query.get("format").cloned().unwrap_or_default();
            filtered(state, |book| book.format.map(|f| f.as_str()) == Some(wanted.as_str()))
        }
        ("GET", ["books", "bylanguage"]) => {
            let wanted = query.get("language").cloned().unwrap_or_default();
            filtered(state, |book| book.language.map(|l| l.as_str()) == Some(wanted.as_str()))
        }
        ("GET", ["books", "sort"]) => {
            let mut books = state.books.clone();
            if query.get("ascending").map(String::as_str) == Some("false") {
                books.reverse();
            }
            json(200, &books)
        }
        ("GET", ["books", "search"]) => {
            let needle = query.get("query").cloned().unwrap_or_default().to_lowercase();
            filtered(state, |book| {
                book.title.to_lowercase().contains(&needle) || book.author.to_lowercase().contains(&needle)
            })
        }
        ("GET", ["books", id]) => match find_book(state, id) {
            Some(index) => json(200, &state.books[index]),
            None => (404, String::new()),
        },
        ("POST", ["books", "add"]) => {
            let id = state.next_id;
            match book_from_multipart(id, request, None) {
                Some(book) => {
                    state.next_id += 1;
                    state.books.push(book.clone());
                    json(201, &book)
                }
                None => (400, "invalid form".to_string()),
            }
        }
        ("PUT", ["books", "update", id]) => match find_book(state, id) {
            Some(index) => {
                let existing = state.books[index].clone();
                match book_from_multipart(existing.id, request, existing.cover_image_url) {
                    Some(book) => {
                        state.books[index] = book.clone();
                        json(200, &book)
                    }
                    None => (400, "invalid form".to_string()),
                }
            }
            None => (404, String::new()),
        },
        ("DELETE", ["books", id]) => match find_book(state, id) {
            Some(index) => {
                state.books.remove(index);
                (204, String::new())
            }
            None => (404, String::new()),
        },
        _ => (404, String::new()),
    }
}

fn filtered(state: &State, keep: impl Fn(&Book) -> bool) -> (u16, String) {
    let books: Vec<&Book> = state.books.iter().filter(|book| keep(*book)).collect();
    json(200, &books)
}

fn find_book(state: &State, id: &str) -> Option<usize> {
    let id: i64 = id.parse().ok()?;
    state.books.iter().position(|book| book.id == id)
}

fn json<T: serde::Serialize + ?Sized>(status: u16, value: &T) -> (u16, String) {
    (status, serde_json::to_string(value).unwrap())
}

fn book_from_multipart(id: i64, request: &RecordedRequest, cover: Option<String>) -> Option<Book> {
    let content_type = request.header("content-type")?;
    let boundary = content_type.split("boundary=").nth(1)?.trim_matches('"');
    let (fields, file_name) = parse_multipart(&request.body, boundary);

    Some(Book {
        id,
        title: fields.get("title")?.clone(),
        author: fields.get("author")?.clone(),
        genre: fields.get("genre")?.parse().ok()?,
        year_published: fields.get("yearPublished")?.parse().ok()?,
        summary: fields.get("summary")?.clone(),
        note: fields.get("note").cloned(),
        cover_image_url: file_name.map(|name| format!("/covers/{}", name)).or(cover),
        publisher: fields.get("publisher").cloned(),
        page_count: fields.get("pageCount").and_then(|v| v.parse().ok()),
        format: fields.get("format").and_then(|v| v.parse().ok()),
        language: fields.get("language").and_then(|v| v.parse().ok()),
    })
}

// Text parts by name, plus the file name of the `file` part if one was sent.
fn parse_multipart(body: &[u8], boundary: &str) -> (HashMap<String, String>, Option<String>) {
    let body = String::from_utf8_lossy(body);
    let delimiter = format!("--{}", boundary);
    let mut fields = HashMap::new();
    let mut file_name = None;

    for part in body.split(delimiter.as_str()) {
        let part = part.trim_start_matches("\r\n");
        let split = match part.find("\r\n\r\n") {
            Some(split) => split,
            None => continue,
        };
        let (head, content) = (&part[..split], &part[split + 4..]);
        let content = content.strip_suffix("\r\n").unwrap_or(content);

        let name = match disposition_param(head, "name") {
            Some(name) => name,
            None => continue,
        };
        if name == "file" {
            file_name = disposition_param(head, "filename");
        } else {
            fields.insert(name, content.to_string());
        }
    }

    (fields, file_name)
}

fn disposition_param(head: &str, key: &str) -> Option<String> {
    let needle = format!("; {}=\"", key);
    let start = head.find(&needle)? + needle.len();
    let end = head[start..].find('"')? + start;
    Some(head[start..end].to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

static ERRORS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Error {
            ERRORS.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

pub fn init_logger() {
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }
    });
}

/// Every error line logged so far, across all tests in this process.
pub fn logged_errors() -> Vec<String> {
    ERRORS.lock().unwrap().clone()
}
