use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::cli::LinkArgs;
use crate::db::{count_rows, open_catalogue};
use crate::util::now_utc_string;

const LINK_EDITIONS_SQL: &str = "
    INSERT OR IGNORE INTO audiobook_text_editions(audiobook_id, text_edition_id, created_at)
    SELECT DISTINCT a.id, t.id, ?1
    FROM audiobooks a
    JOIN text_editions t
      ON t.normalized_key = a.normalized_key
     AND t.author_normalized = a.author_normalized
    WHERE a.normalized_key != ''
      AND NOT EXISTS (
        SELECT 1 FROM audiobook_text_editions ate
        WHERE ate.audiobook_id = a.id AND ate.text_edition_id = t.id
      )";

#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    pub new_links: usize,
    pub total_links: i64,
    pub audiobooks: i64,
    pub text_editions: i64,
    pub linked_audiobooks: i64,
    pub coverage_percent: f64,
    pub mean_editions: f64,
}

pub fn run(args: LinkArgs) -> Result<()> {
    info!(db_path = %args.db_path.display(), "linking audiobooks to text editions");

    let connection = open_catalogue(&args.db_path)?;
    let report = link_editions(&connection)?;

    info!(
        new_links = report.new_links,
        total_links = report.total_links,
        linked_audiobooks = report.linked_audiobooks,
        "edition linking finished"
    );
    println!("new links:          {}", report.new_links);
    println!("total links:        {}", report.total_links);
    println!("audiobooks:         {}", report.audiobooks);
    println!("text editions:      {}", report.text_editions);
    println!(
        "linked audiobooks:  {} ({:.2}%)",
        report.linked_audiobooks, report.coverage_percent
    );
    println!("editions per book:  {:.2}", report.mean_editions);
    Ok(())
}

pub fn link_editions(connection: &Connection) -> Result<LinkReport> {
    let new_links = connection
        .execute(LINK_EDITIONS_SQL, [now_utc_string()])
        .context("failed to link audiobooks to text editions")?;

    let total_links = count_rows(connection, "SELECT COUNT(*) FROM audiobook_text_editions")?;
    let audiobooks = count_rows(connection, "SELECT COUNT(*) FROM audiobooks")?;
    let text_editions = count_rows(connection, "SELECT COUNT(*) FROM text_editions")?;
    let linked_audiobooks = count_rows(
        connection,
        "SELECT COUNT(DISTINCT audiobook_id) FROM audiobook_text_editions",
    )?;

    let coverage_percent = if audiobooks > 0 {
        linked_audiobooks as f64 * 100.0 / audiobooks as f64
    } else {
        0.0
    };
    let mean_editions = if linked_audiobooks > 0 {
        total_links as f64 / linked_audiobooks as f64
    } else {
        0.0
    };

    Ok(LinkReport {
        new_links,
        total_links,
        audiobooks,
        text_editions,
        linked_audiobooks,
        coverage_percent,
        mean_editions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed(connection: &Connection) {
        connection
            .execute_batch(
                "
                INSERT INTO audiobooks(id, external_id, name, slug, price, url, normalized_key, author_normalized, created_at, updated_at) VALUES
                  (1, 101, 'Война и мир', 'voina-i-mir-101', 0, 'u1', 'война и мир', 'лев толстой', 't', 't'),
                  (2, 102, 'Идиот', 'idiot-102', 0, 'u2', 'идиот', 'фёдор достоевский', 't', 't'),
                  (3, 103, '???', 'untitled-103', 0, 'u3', '', '', 't', 't');
                INSERT INTO text_editions(id, external_id, name, url, normalized_key, author_normalized, created_at, updated_at) VALUES
                  (10, 201, 'Война и мир', 'b1', 'война и мир', 'лев толстой', 't', 't'),
                  (11, 202, 'Война и мир. Том 1', 'b2', 'война и мир', 'лев толстой', 't', 't'),
                  (12, 203, 'Война и мир', 'b3', 'война и мир', 'другой автор', 't', 't'),
                  (13, 204, '', 'b4', '', '', 't', 't');
                ",
            )
            .unwrap();
    }

    #[test]
    fn links_exact_title_and_author_matches() {
        let connection = open_in_memory();
        seed(&connection);

        let report = link_editions(&connection).unwrap();
        assert_eq!(report.new_links, 2);
        assert_eq!(report.total_links, 2);
        assert_eq!(report.audiobooks, 3);
        assert_eq!(report.text_editions, 4);
        assert_eq!(report.linked_audiobooks, 1);
        assert!((report.coverage_percent - 100.0 / 3.0).abs() < 1e-9);
        assert!((report.mean_editions - 2.0).abs() < 1e-9);

        let mut statement = connection
            .prepare(
                "SELECT text_edition_id FROM audiobook_text_editions
                 WHERE audiobook_id = 1 ORDER BY text_edition_id",
            )
            .unwrap();
        let linked: Vec<i64> = statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(linked, vec![10, 11]);
    }

    #[test]
    fn second_run_inserts_nothing() {
        let connection = open_in_memory();
        seed(&connection);

        link_editions(&connection).unwrap();
        let created_at: String = connection
            .query_row(
                "SELECT created_at FROM audiobook_text_editions WHERE text_edition_id = 10",
                [],
                |row| row.get(0),
            )
            .unwrap();

        let report = link_editions(&connection).unwrap();
        assert_eq!(report.new_links, 0);
        assert_eq!(report.total_links, 2);

        let unchanged: String = connection
            .query_row(
                "SELECT created_at FROM audiobook_text_editions WHERE text_edition_id = 10",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(created_at, unchanged);
    }

    #[test]
    fn empty_catalogue_reports_zero_coverage() {
        let connection = open_in_memory();
        let report = link_editions(&connection).unwrap();
        assert_eq!(report.new_links, 0);
        assert_eq!(report.coverage_percent, 0.0);
        assert_eq!(report.mean_editions, 0.0);
    }
}
