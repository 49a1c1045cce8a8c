use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::{ClientError, Result};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub year_published: i32,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

/// Error returned when text doesn't name any value of a book enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseEnumError {
    kind: &'static str,
    input: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.input)
    }
}

impl std::error::Error for ParseEnumError {}

// "Science Fiction", "science-fiction" and "ScienceFiction" all compare equal.
fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! book_enum {
    ($name:ident, $kind:expr, { $($variant:ident => $display:literal),+ $(,)? }) => {
        #[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[serde(rename = $display)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The display string the backend uses on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $display,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let wanted = normalize(s);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| normalize(value.as_str()) == wanted)
                    .ok_or_else(|| ParseEnumError {
                        kind: $kind,
                        input: s.to_string(),
                    })
            }
        }
    };
}

book_enum!(Genre, "genre", {
    Fiction => "Fiction",
    NonFiction => "Non-Fiction",
    Mystery => "Mystery",
    ScienceFiction => "Science Fiction",
    Fantasy => "Fantasy",
    Biography => "Biography",
    History => "History",
    Romance => "Romance",
    Thriller => "Thriller",
    Horror => "Horror",
    SelfHelp => "Self-Help",
    Children => "Children",
    YoungAdult => "Young Adult",
    Dystopian => "Dystopian",
    PoliticalSatire => "Political Satire",
});

book_enum!(Format, "format", {
    Hardcover => "Hardcover",
    Paperback => "Paperback",
    Ebook => "Ebook",
    Audiobook => "Audiobook",
});

book_enum!(Language, "language", {
    English => "English",
    German => "German",
    Russian => "Russian",
    Arabic => "Arabic",
});

/// A binary file uploaded alongside a book, usually its cover.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        Attachment {
            file_name: file_name.to_string(),
            mime_type: guess_mime_type(file_name).to_string(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Attachment::new(&file_name, bytes))
    }
}

fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        _ => "application/octet-stream",
    }
}

/// Fields submitted to the backend when creating or replacing a book.
#[derive(Clone, Debug, PartialEq)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub year_published: i32,
    pub summary: String,
    pub note: Option<String>,
    pub publisher: Option<String>,
    pub page_count: Option<u32>,
    pub format: Option<Format>,
    pub language: Option<Language>,
    pub attachment: Option<Attachment>,
}

impl BookForm {
    pub fn new(title: &str, author: &str, genre: Genre, year_published: i32, summary: &str) -> Self {
        BookForm {
            title: title.to_string(),
            author: author.to_string(),
            genre,
            year_published,
            summary: summary.to_string(),
            note: None,
            publisher: None,
            page_count: None,
            format: None,
            language: None,
            attachment: None,
        }
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn publisher(mut self, publisher: &str) -> Self {
        self.publisher = Some(publisher.to_string());
        self
    }

    pub fn page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// A form carrying the current state of `book`, ready to be edited and
    /// sent back as an update.
    pub fn from_book(book: &Book) -> Self {
        BookForm {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre,
            year_published: book.year_published,
            summary: book.summary.clone(),
            note: book.note.clone(),
            publisher: book.publisher.clone(),
            page_count: book.page_count,
            format: book.format,
            language: book.language,
            attachment: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("title", &self.title),
            ("author", &self.author),
            ("summary", &self.summary),
        ];
        for (name, value) in required.iter() {
            if value.trim().is_empty() {
                return Err(ClientError::InvalidForm(format!("{} must not be empty", name)));
            }
        }
        if self.page_count == Some(0) {
            return Err(ClientError::InvalidForm(
                "pageCount must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    /// Text parts of the multipart body, keyed like the JSON representation.
    /// Absent optional fields are left out.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("title", self.title.clone()),
            ("author", self.author.clone()),
            ("genre", self.genre.as_str().to_string()),
            ("yearPublished", self.year_published.to_string()),
            ("summary", self.summary.clone()),
        ];
        if let Some(note) = &self.note {
            fields.push(("note", note.clone()));
        }
        if let Some(publisher) = &self.publisher {
            fields.push(("publisher", publisher.clone()));
        }
        if let Some(pages) = self.page_count {
            fields.push(("pageCount", pages.to_string()));
        }
        if let Some(format) = self.format {
            fields.push(("format", format.as_str().to_string()));
        }
        if let Some(language) = self.language {
            fields.push(("language", language.as_str().to_string()));
        }
        fields
    }
}
