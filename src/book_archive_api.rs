use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::book::{Book, BookForm, Format, Genre, Language};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Async client for the book archive REST API.
///
/// Every call is a single request against the backend; nothing is cached.
/// Failures are logged with the operation that produced them and then
/// returned to the caller untouched.
#[derive(Clone, Debug)]
pub struct BookArchiveClient {
    http: reqwest::Client,
    base_url: String,
}

impl BookArchiveClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.validated_base_url()?;
        let http = reqwest::Client::builder()
            .default_headers(config.header_map()?)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(BookArchiveClient { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_books(&self) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books");
        self.fetch_json(self.http.get(&request_url), "list books", "books")
            .await
            .map_err(|err| {
                log::error!("Error fetching books: {}", err);
                err
            })
    }

    pub async fn get_book(&self, id: i64) -> Result<Book> {
        let request_url = self.endpoint(&format!("books/{}", id));
        let resource = format!("book {}", id);
        self.fetch_json(self.http.get(&request_url), "get book", &resource)
            .await
            .map_err(|err| {
                log::error!("Error fetching book with id {}: {}", id, err);
                err
            })
    }

    pub async fn create_book(&self, form: &BookForm) -> Result<Book> {
        let request_url = self.endpoint("books/add");
        let book = self
            .send_form(self.http.post(&request_url), form, "create book", "books/add")
            .await
            .map_err(|err| {
                log::error!("Error creating book '{}': {}", form.title, err);
                err
            })?;
        log::info!("Created book {} '{}'", book.id, book.title);
        Ok(book)
    }

    pub async fn update_book(&self, id: i64, form: &BookForm) -> Result<Book> {
        let request_url = self.endpoint(&format!("books/update/{}", id));
        let resource = format!("book {}", id);
        let book = self
            .send_form(self.http.put(&request_url), form, "update book", &resource)
            .await
            .map_err(|err| {
                log::error!("Error updating book with id {}: {}", id, err);
                err
            })?;
        log::info!("Updated book {}", id);
        Ok(book)
    }

    pub async fn delete_book(&self, id: i64) -> Result<()> {
        let request_url = self.endpoint(&format!("books/{}", id));
        let resource = format!("book {}", id);
        self.send(self.http.delete(&request_url), &resource)
            .await
            .map_err(|err| {
                log::error!("Error deleting book with id {}: {}", id, err);
                err
            })?;
        log::info!("Deleted book {}", id);
        Ok(())
    }

    pub async fn get_books_by_genre(&self, genre: Genre) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books/bygenre");
        let request = self.http.get(&request_url).query(&[("genre", genre.as_str())]);
        self.fetch_json(request, "filter books by genre", "books/bygenre")
            .await
            .map_err(|err| {
                log::error!("Error fetching books by genre {}: {}", genre, err);
                err
            })
    }

    pub async fn get_books_by_format(&self, format: Format) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books/byformat");
        let request = self.http.get(&request_url).query(&[("format", format.as_str())]);
        self.fetch_json(request, "filter books by format", "books/byformat")
            .await
            .map_err(|err| {
                log::error!("Error fetching books by format {}: {}", format, err);
                err
            })
    }

    pub async fn get_books_by_language(&self, language: Language) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books/bylanguage");
        let request = self
            .http
            .get(&request_url)
            .query(&[("language", language.as_str())]);
        self.fetch_json(request, "filter books by language", "books/bylanguage")
            .await
            .map_err(|err| {
                log::error!("Error fetching books by language {}: {}", language, err);
                err
            })
    }

    /// Books ordered by the backend's creation timestamp.
    pub async fn sort_books_by_date(&self, ascending: bool) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books/sort");
        let request = self.http.get(&request_url).query(&[("ascending", ascending)]);
        self.fetch_json(request, "sort books", "books/sort")
            .await
            .map_err(|err| {
                log::error!("Error sorting books (ascending: {}): {}", ascending, err);
                err
            })
    }

    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let request_url = self.endpoint("books/search");
        let request = self.http.get(&request_url).query(&[("query", query)]);
        self.fetch_json(request, "search books", "books/search")
            .await
            .map_err(|err| {
                log::error!("Error searching books for '{}': {}", query, err);
                err
            })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response> {
        let response = request.send().await?;
        log::debug!("{} -> {}", response.url(), response.status());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                resource: resource.to_string(),
            });
        }

        let message = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Couldn't read error body for {}: {}", resource, err);
                status.canonical_reason().unwrap_or_default().to_string()
            }
        };
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_form(
        &self,
        request: RequestBuilder,
        form: &BookForm,
        operation: &'static str,
        resource: &str,
    ) -> Result<Book> {
        let body = multipart(form)?;
        self.fetch_json(request.multipart(body), operation, resource).await
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        resource: &str,
    ) -> Result<T> {
        let response = self.send(request, resource).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ClientError::MalformedResponse { operation, source })
    }
}

fn multipart(form: &BookForm) -> Result<Form> {
    form.validate()?;

    let mut body = Form::new();
    for (name, value) in form.fields() {
        body = body.text(name, value);
    }
    if let Some(attachment) = &form.attachment {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)?;
        body = body.part("file", part);
    }
    Ok(body)
}
