use std::io::Write;
use std::path::Path;

use indicatif::ProgressBar;
use rusqlite::Connection;
use tempfile::{NamedTempFile, TempDir};

use super::run::import_rows;
use crate::cli::ImportAudiobooksArgs;
use crate::db::{count_rows, open_in_memory};
use crate::model::AudiobookImportCounts;
use crate::slug::audiobook_slug;
use crate::source::read_all;

const HEADER: &str = "id;name;description;category;price;url;image;brand;params";

fn source_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}

fn import(connection: &mut Connection, path: &Path, batch_size: usize) -> AudiobookImportCounts {
    let rows = read_all(path).unwrap();
    import_rows(connection, rows, batch_size, &ProgressBar::hidden()).unwrap()
}

fn count(connection: &Connection, table: &str) -> i64 {
    count_rows(connection, &format!("SELECT COUNT(*) FROM {table}")).unwrap()
}

fn link_ids(connection: &Connection, sql: &str, external_id: i64) -> Vec<i64> {
    let mut statement = connection.prepare(sql).unwrap();
    statement
        .query_map([external_id], |row| row.get(0))
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
}

type AudiobookSnapshot = (i64, String, String, f64, String, Option<String>, Option<String>);

fn snapshot(connection: &Connection) -> Vec<AudiobookSnapshot> {
    let mut statement = connection
        .prepare(
            "SELECT external_id, name, slug, price, url, formats, fragment_url
             FROM audiobooks ORDER BY external_id",
        )
        .unwrap();
    statement
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
}

#[test]
fn war_and_peace_row_creates_book_author_and_genres() {
    let file = source_file(&[
        "100;Война и мир;Роман-эпопея;Классика > Роман;199.00;https://shop.example/audiobook/100;;Лев Толстой;Форматы:mp3, m4b|Фрагмент:https://cdn.example/100.mp3",
    ]);
    let mut connection = open_in_memory();

    let counts = import(&mut connection, file.path(), 1000);
    assert_eq!(counts.processed, 1);
    assert_eq!(counts.errors, 0);
    assert_eq!(counts.authors_created, 1);
    assert_eq!(counts.genres_created, 2);

    let (slug, price, formats): (String, f64, String) = connection
        .query_row(
            "SELECT slug, price, formats FROM audiobooks WHERE external_id = 100",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(slug, audiobook_slug("Война и мир", 100));
    assert!(slug.ends_with("-100"));
    assert!(slug.is_ascii());
    assert_eq!(price, 199.0);
    assert_eq!(formats, r#"["mp3","m4b"]"#);

    let (author_name, author_slug): (String, String) = connection
        .query_row("SELECT name, slug FROM authors", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(author_name, "Лев Толстой");
    assert!(author_slug.is_ascii());
    assert!(!author_slug.is_empty());

    let (root_id, root_parent): (i64, Option<i64>) = connection
        .query_row(
            "SELECT id, parent_id FROM genres WHERE name = 'Классика'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(root_parent.is_none());
    let child_parent: Option<i64> = connection
        .query_row("SELECT parent_id FROM genres WHERE name = 'Роман'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(child_parent, Some(root_id));

    let second = import(&mut connection, file.path(), 1000);
    assert_eq!(second.authors_created, 0);
    assert_eq!(second.genres_created, 0);
    assert_eq!(count(&connection, "authors"), 1);
    assert_eq!(count(&connection, "genres"), 2);
}

#[test]
fn reimport_leaves_rows_and_fields_unchanged() {
    let file = source_file(&[
        "1;First;;Fiction > Novels;10.50;https://shop.example/audiobook/1;https://img/1.jpg;Anna Smith;Форматы:mp3",
        "2;Second;;Fiction;;https://shop.example/audiobook/2;;;",
        "3;Third;Desc;Science > Physics;5;https://shop.example/audiobook/3;;Bob Jones;",
    ]);
    let mut connection = open_in_memory();

    import(&mut connection, file.path(), 2);
    let before = snapshot(&connection);
    let authors_before = count(&connection, "authors");
    let links_before = count(&connection, "audiobook_genres");

    let counts = import(&mut connection, file.path(), 2);
    assert_eq!(counts.processed, 3);
    assert_eq!(counts.batches, 2);
    assert_eq!(snapshot(&connection), before);
    assert_eq!(count(&connection, "authors"), authors_before);
    assert_eq!(count(&connection, "audiobook_genres"), links_before);
    assert_eq!(before.len(), 3);
}

#[test]
fn empty_brand_links_to_unknown_author() {
    let file = source_file(&["5;Anonymous;;;0;https://shop.example/audiobook/5;;;"]);
    let mut connection = open_in_memory();
    import(&mut connection, file.path(), 10);

    let author: String = connection
        .query_row(
            "SELECT a.name FROM authors a
             JOIN audiobook_authors aa ON aa.author_id = a.id",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(author, super::authors::UNKNOWN_AUTHOR);
    assert_eq!(count(&connection, "audiobook_genres"), 0);
}

#[test]
fn category_change_replaces_genre_links() {
    let mut connection = open_in_memory();
    let first = source_file(&["7;Book;;P1;1;https://shop.example/audiobook/7;;Author;"]);
    import(&mut connection, first.path(), 10);

    let second = source_file(&["7;Book;;P2 > Sub;1;https://shop.example/audiobook/7;;Other Author;"]);
    import(&mut connection, second.path(), 10);

    let genre_names: Vec<String> = {
        let mut statement = connection
            .prepare(
                "SELECT g.name FROM audiobook_genres ag
                 JOIN genres g ON g.id = ag.genre_id
                 ORDER BY g.id",
            )
            .unwrap();
        statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect()
    };
    assert_eq!(genre_names, vec!["P2", "Sub"]);

    let authors = link_ids(
        &connection,
        "SELECT aa.author_id FROM audiobook_authors aa
         JOIN audiobooks a ON a.id = aa.audiobook_id
         WHERE a.external_id = ?1",
        7,
    );
    let other_author: i64 = connection
        .query_row("SELECT id FROM authors WHERE name = 'Other Author'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(authors, vec![other_author]);
    assert_eq!(count(&connection, "genres"), 3);
}

#[test]
fn colliding_author_names_get_distinct_slugs() {
    let file = source_file(&[
        "1;A;;;1;https://shop.example/audiobook/1;;Anna Smith;",
        "2;B;;;1;https://shop.example/audiobook/2;;anna smith;",
        "3;C;;;1;https://shop.example/audiobook/3;;Anna Smith;",
    ]);
    let mut connection = open_in_memory();
    import(&mut connection, file.path(), 10);

    assert_eq!(count(&connection, "authors"), 2);
    let distinct_slugs =
        count_rows(&connection, "SELECT COUNT(DISTINCT slug) FROM authors").unwrap();
    assert_eq!(distinct_slugs, 2);
}

#[test]
fn bad_rows_are_counted_and_skipped() {
    let file = source_file(&[
        "1;Good;;;1;https://shop.example/audiobook/1;;Author;",
        "x;Bad id;;;1;https://shop.example/audiobook/2;;Author;",
        "3;Bad price;;;cheap;https://shop.example/audiobook/3;;Author;",
        "4;No url;;;1;;;Author;",
        "5;;;;1;https://shop.example/audiobook/5;;Author;",
    ]);
    let mut connection = open_in_memory();
    let counts = import(&mut connection, file.path(), 10);

    assert_eq!(counts.records_read, 5);
    assert_eq!(counts.processed, 1);
    assert_eq!(counts.errors, 4);
    assert_eq!(count(&connection, "audiobooks"), 1);
}

#[test]
fn non_finite_price_is_a_row_error() {
    let file = source_file(&[
        "1;First;;;10;https://shop.example/audiobook/1;;Author;",
        "2;Not a number;;;NaN;https://shop.example/audiobook/2;;Author;",
        "3;Third;;;inf;https://shop.example/audiobook/3;;Author;",
        "4;Fourth;;;20;https://shop.example/audiobook/4;;Author;",
    ]);
    let mut connection = open_in_memory();
    let counts = import(&mut connection, file.path(), 10);

    assert_eq!(counts.processed, 2);
    assert_eq!(counts.errors, 2);
    let stored: Vec<(i64, f64)> = {
        let mut statement = connection
            .prepare("SELECT external_id, price FROM audiobooks ORDER BY external_id")
            .unwrap();
        statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|row| row.unwrap())
            .collect()
    };
    assert_eq!(stored, vec![(1, 10.0), (4, 20.0)]);
}

#[test]
fn duplicate_external_ids_in_one_batch_keep_the_last_row() {
    let file = source_file(&[
        "9;Early title;;A;1;https://shop.example/audiobook/9;;Author;",
        "9;Late title;;B;2;https://shop.example/audiobook/9;;Author;",
    ]);
    let mut connection = open_in_memory();
    let counts = import(&mut connection, file.path(), 10);

    assert_eq!(counts.processed, 1);
    let (name, price): (String, f64) = connection
        .query_row(
            "SELECT name, price FROM audiobooks WHERE external_id = 9",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "Late title");
    assert_eq!(price, 2.0);
    assert_eq!(count(&connection, "audiobook_genres"), 1);
}

#[test]
fn run_writes_catalogue_and_summary() {
    let dir = TempDir::new().unwrap();
    let file = source_file(&[
        "100;Война и мир;;Классика > Роман;199.00;https://shop.example/audiobook/100;;Лев Толстой;",
    ]);
    let db_path = dir.path().join("catalogue.sqlite");
    let summary_path = dir.path().join("summary.json");

    super::run(ImportAudiobooksArgs {
        db_path: db_path.clone(),
        file: file.path().to_path_buf(),
        batch_size: 1000,
        summary_path: Some(summary_path.clone()),
    })
    .unwrap();

    let connection = Connection::open(&db_path).unwrap();
    assert_eq!(count(&connection, "audiobooks"), 1);

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["command"], "import-audiobooks");
    assert_eq!(summary["counts"]["processed"], 1);
    assert_eq!(summary["counts"]["genres_created"], 2);
}

#[test]
fn run_rejects_zero_batch_size_and_missing_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalogue.sqlite");

    let zero = super::run(ImportAudiobooksArgs {
        db_path: db_path.clone(),
        file: dir.path().join("missing.csv"),
        batch_size: 0,
        summary_path: None,
    });
    assert!(zero.is_err());

    let missing = super::run(ImportAudiobooksArgs {
        db_path: db_path.clone(),
        file: dir.path().join("missing.csv"),
        batch_size: 10,
        summary_path: None,
    });
    assert!(missing.unwrap_err().to_string().contains("source file not found"));
    assert!(!db_path.exists());
}
