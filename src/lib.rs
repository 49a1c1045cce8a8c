pub mod book;
pub mod book_archive_api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;

#[cfg(test)]
mod test_support;

pub use book::{Attachment, Book, BookForm, Format, Genre, Language};
pub use book_archive_api::BookArchiveClient;
pub use config::ClientConfig;
pub use error::{ClientError, ExportError, Result};
