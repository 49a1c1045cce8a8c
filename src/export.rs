use std::fs::File;
use std::io::Write;

use serde::Serialize;

use crate::book::Book;
use crate::db;
use crate::error::ExportError;

#[derive(Serialize)]
struct BookRow<'a> {
    id: i64,
    title: &'a str,
    author: &'a str,
    genre: &'static str,
    year_published: i32,
    summary: &'a str,
    note: Option<&'a str>,
    cover_image_url: Option<&'a str>,
    publisher: Option<&'a str>,
    page_count: Option<u32>,
    format: Option<&'static str>,
    language: Option<&'static str>,
}

impl<'a> From<&'a Book> for BookRow<'a> {
    fn from(book: &'a Book) -> Self {
        BookRow {
            id: book.id,
            title: &book.title,
            author: &book.author,
            genre: book.genre.as_str(),
            year_published: book.year_published,
            summary: &book.summary,
            note: book.note.as_deref(),
            cover_image_url: book.cover_image_url.as_deref(),
            publisher: book.publisher.as_deref(),
            page_count: book.page_count,
            format: book.format.map(|f| f.as_str()),
            language: book.language.map(|l| l.as_str()),
        }
    }
}

pub fn write_csv<W: Write>(books: &[Book], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for book in books {
        wtr.serialize(BookRow::from(book))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(books: &[Book], path: &str) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_csv(books, file)?;
    log::info!("Exported {} books to {}", books.len(), path);
    Ok(())
}

pub fn export_sqlite(books: &[Book], path: &str) -> Result<usize, ExportError> {
    let mut conn = db::init_db(path)?;
    let written = db::store_books(&mut conn, books)?;
    log::info!("Stored {} books in {}", written, path);
    Ok(written)
}
