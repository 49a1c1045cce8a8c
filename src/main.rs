use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Error};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use serde::Serialize;
use simplelog::{LevelFilter, TermLogger, TerminalMode};

use book_archive::export::{export_csv, export_sqlite};
use book_archive::{Attachment, BookArchiveClient, BookForm, ClientConfig, Format, Genre, Language};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn form_args() -> Vec<Arg<'static, 'static>> {
    vec![
        Arg::with_name("title").long("title").takes_value(true).required(true),
        Arg::with_name("author").long("author").takes_value(true).required(true),
        Arg::with_name("genre")
            .long("genre")
            .takes_value(true)
            .required(true)
            .help("e.g. \"Science Fiction\" or science-fiction"),
        Arg::with_name("year").long("year").takes_value(true).required(true),
        Arg::with_name("summary").long("summary").takes_value(true).required(true),
        Arg::with_name("note").long("note").takes_value(true),
        Arg::with_name("publisher").long("publisher").takes_value(true),
        Arg::with_name("pages").long("pages").takes_value(true),
        Arg::with_name("format").long("format").takes_value(true),
        Arg::with_name("language").long("language").takes_value(true),
        Arg::with_name("file")
            .long("file")
            .takes_value(true)
            .help("Cover image or book file to upload"),
    ]
}

fn id_arg() -> Arg<'static, 'static> {
    Arg::with_name("id").required(true).help("Book id")
}

fn cli() -> App<'static, 'static> {
    App::new("book-archive")
        .version(VERSION)
        .about("Manage a personal book archive through its HTTP API")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .global(true)
                .help("TOML file with connection settings"),
        )
        .arg(
            Arg::with_name("url")
                .long("url")
                .takes_value(true)
                .global(true)
                .help("Backend base url, e.g. https://localhost:7179/api"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("More logging (-v info, -vv debug)"),
        )
        .subcommand(SubCommand::with_name("list").about("List every book"))
        .subcommand(SubCommand::with_name("get").about("Show one book").arg(id_arg()))
        .subcommand(SubCommand::with_name("add").about("Create a book").args(&form_args()))
        .subcommand(
            SubCommand::with_name("update")
                .about("Replace a book")
                .arg(id_arg())
                .args(&form_args()),
        )
        .subcommand(SubCommand::with_name("delete").about("Delete a book").arg(id_arg()))
        .subcommand(
            SubCommand::with_name("genre")
                .about("Books of one genre")
                .arg(Arg::with_name("genre").required(true)),
        )
        .subcommand(
            SubCommand::with_name("format")
                .about("Books in one format")
                .arg(Arg::with_name("format").required(true)),
        )
        .subcommand(
            SubCommand::with_name("language")
                .about("Books in one language")
                .arg(Arg::with_name("language").required(true)),
        )
        .subcommand(
            SubCommand::with_name("sort")
                .about("Books by date added")
                .arg(Arg::with_name("descending").long("descending").help("Newest first")),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Free text search")
                .arg(Arg::with_name("query").required(true)),
        )
        .subcommand(
            SubCommand::with_name("export")
                .about("Save the whole archive locally")
                .arg(Arg::with_name("csv").long("csv").takes_value(true))
                .arg(Arg::with_name("sqlite").long("sqlite").takes_value(true))
                .group(
                    clap::ArgGroup::with_name("target")
                        .args(&["csv", "sqlite"])
                        .required(true)
                        .multiple(true),
                ),
        )
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if TermLogger::init(level, simplelog::Config::default(), TerminalMode::Stderr).is_err() {
        eprintln!("Couldn't initialize logging");
    }
}

// Global flags given after the subcommand only show up in its matches.
fn global_value<'a>(matches: &'a ArgMatches, name: &str) -> Option<&'a str> {
    matches
        .value_of(name)
        .or_else(|| matches.subcommand().1.and_then(|sub| sub.value_of(name)))
}

fn verbosity(matches: &ArgMatches) -> u64 {
    let sub = matches.subcommand().1.map_or(0, |sub| sub.occurrences_of("verbose"));
    matches.occurrences_of("verbose").max(sub)
}

fn config_from(matches: &ArgMatches, vars: &HashMap<String, String>) -> Result<ClientConfig, Error> {
    let config = ClientConfig::resolve(
        global_value(matches, "config").map(Path::new),
        vars,
        global_value(matches, "url"),
    )?;
    Ok(config)
}

fn load_config(matches: &ArgMatches) -> Result<ClientConfig, Error> {
    let vars: HashMap<String, String> = dotenv::vars().collect();
    config_from(matches, &vars)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, Error> {
    matches
        .value_of(name)
        .with_context(|| format!("missing argument '{}'", name))
}

fn parse_id(matches: &ArgMatches) -> Result<i64, Error> {
    let raw = required(matches, "id")?;
    raw.parse()
        .with_context(|| format!("invalid book id '{}'", raw))
}

async fn read_form(matches: &ArgMatches<'_>) -> Result<BookForm, Error> {
    let genre: Genre = required(matches, "genre")?.parse()?;
    let year_raw = required(matches, "year")?;
    let year: i32 = year_raw
        .parse()
        .with_context(|| format!("invalid year '{}'", year_raw))?;

    let mut form = BookForm::new(
        required(matches, "title")?,
        required(matches, "author")?,
        genre,
        year,
        required(matches, "summary")?,
    );

    if let Some(note) = matches.value_of("note") {
        form = form.note(note);
    }
    if let Some(publisher) = matches.value_of("publisher") {
        form = form.publisher(publisher);
    }
    if let Some(pages) = matches.value_of("pages") {
        let pages: u32 = pages
            .parse()
            .with_context(|| format!("invalid page count '{}'", pages))?;
        form = form.page_count(pages);
    }
    if let Some(format) = matches.value_of("format") {
        form = form.format(format.parse::<Format>()?);
    }
    if let Some(language) = matches.value_of("language") {
        form = form.language(language.parse::<Language>()?);
    }
    if let Some(path) = matches.value_of("file") {
        form = form.attachment(Attachment::from_path(path).await?);
    }

    Ok(form)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Error> {
    let matches = cli().get_matches();
    init_logging(verbosity(&matches));

    let config = load_config(&matches)?;
    let client = BookArchiveClient::new(config)?;
    log::debug!("using backend {}", client.base_url());

    match matches.subcommand() {
        ("list", _) => print_json(&client.get_books().await?)?,
        ("get", Some(sub)) => print_json(&client.get_book(parse_id(sub)?).await?)?,
        ("add", Some(sub)) => {
            let form = read_form(sub).await?;
            print_json(&client.create_book(&form).await?)?
        }
        ("update", Some(sub)) => {
            let id = parse_id(sub)?;
            let form = read_form(sub).await?;
            print_json(&client.update_book(id, &form).await?)?
        }
        ("delete", Some(sub)) => {
            let id = parse_id(sub)?;
            client.delete_book(id).await?;
            println!("Deleted book {}", id);
        }
        ("genre", Some(sub)) => {
            let genre: Genre = required(sub, "genre")?.parse()?;
            print_json(&client.get_books_by_genre(genre).await?)?
        }
        ("format", Some(sub)) => {
            let format: Format = required(sub, "format")?.parse()?;
            print_json(&client.get_books_by_format(format).await?)?
        }
        ("language", Some(sub)) => {
            let language: Language = required(sub, "language")?.parse()?;
            print_json(&client.get_books_by_language(language).await?)?
        }
        ("sort", Some(sub)) => {
            let ascending = !sub.is_present("descending");
            print_json(&client.sort_books_by_date(ascending).await?)?
        }
        ("search", Some(sub)) => print_json(&client.search_books(required(sub, "query")?).await?)?,
        ("export", Some(sub)) => {
            let books = client.get_books().await?;
            if let Some(path) = sub.value_of("csv") {
                export_csv(&books, path)?;
                println!("Wrote {} books to {}", books.len(), path);
            }
            if let Some(path) = sub.value_of("sqlite") {
                let written = export_sqlite(&books, path)?;
                println!("Stored {} books in {}", written, path);
            }
        }
        (other, _) => bail!("unknown command '{}'", other),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}
