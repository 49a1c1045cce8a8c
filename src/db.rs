use rusqlite::types::Type;
use rusqlite::{params, Connection, Result, Row};

use crate::book::Book;

pub fn init_db(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "create table if not exists books (
            id integer primary key,
            title text not null,
            author text not null,
            genre text not null,
            year_published integer not null,
            summary text not null,
            note text,
            cover_image_url text,
            publisher text,
            page_count integer,
            format text,
            language text
        )",
        [],
    )?;
    conn.execute(
        "create index if not exists
             idx_genre on books (genre)",
        [],
    )?;

    Ok(())
}

/// Writes `books` into the snapshot, replacing rows with the same id.
/// Returns the number of rows written.
pub fn store_books(conn: &mut Connection, books: &[Book]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut written = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO books (
                    id,
                    title,
                    author,
                    genre,
                    year_published,
                    summary,
                    note,
                    cover_image_url,
                    publisher,
                    page_count,
                    format,
                    language
                )
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for book in books {
            written += stmt.execute(params![
                book.id,
                book.title,
                book.author,
                book.genre.as_str(),
                book.year_published,
                book.summary,
                book.note,
                book.cover_image_url,
                book.publisher,
                book.page_count,
                book.format.map(|f| f.as_str()),
                book.language.map(|l| l.as_str()),
            ])?;
        }
    }
    tx.commit()?;

    Ok(written)
}

pub fn load_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, author, genre, year_published, summary, note,
                cover_image_url, publisher, page_count, format, language
             FROM books
             ORDER BY id",
    )?;

    let books = stmt.query_map([], read_book)?.collect::<Result<Vec<Book>>>()?;
    Ok(books)
}

fn read_book(row: &Row) -> Result<Book> {
    let genre: String = row.get(3)?;
    let format: Option<String> = row.get(10)?;
    let language: Option<String> = row.get(11)?;

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        genre: parse_column(3, &genre)?,
        year_published: row.get(4)?,
        summary: row.get(5)?,
        note: row.get(6)?,
        cover_image_url: row.get(7)?,
        publisher: row.get(8)?,
        page_count: row.get(9)?,
        format: format.map(|f| parse_column(10, &f)).transpose()?,
        language: language.map(|l| parse_column(11, &l)).transpose()?,
    })
}

fn parse_column<T>(index: usize, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}
