use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::{Connection, params_from_iter};
use tracing::info;

use crate::db::values_placeholders;
use crate::slug::SlugRegistry;
use crate::util::truncate_with_ellipsis;

pub const UNKNOWN_AUTHOR: &str = "Неизвестный автор";

const AUTHOR_NAME_MAX_CHARS: usize = 255;
const AUTHOR_INSERT_CHUNK: usize = 5_000;

pub fn author_display_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_AUTHOR.to_string();
    }
    truncate_with_ellipsis(trimmed, AUTHOR_NAME_MAX_CHARS)
}

#[derive(Debug, Default)]
pub struct AuthorResolution {
    pub ids: HashMap<String, i64>,
    pub created: usize,
}

#[derive(Debug)]
pub struct AuthorResolver {
    by_name: HashMap<String, i64>,
    slugs: SlugRegistry,
}

impl AuthorResolver {
    pub fn load(connection: &Connection) -> Result<Self> {
        let mut statement = connection
            .prepare("SELECT id, name, slug FROM authors")
            .context("failed to prepare author lookup")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut by_name = HashMap::new();
        let mut slugs = Vec::new();
        for row in rows {
            let (id, name, slug) = row.context("failed to read author row")?;
            by_name.insert(name, id);
            slugs.push(slug);
        }

        Ok(Self {
            by_name,
            slugs: SlugRegistry::with_existing(slugs),
        })
    }

    pub fn resolve(
        &mut self,
        connection: &mut Connection,
        raw_names: &BTreeSet<String>,
    ) -> Result<AuthorResolution> {
        let mut staged_names = HashSet::new();
        let mut staged = Vec::new();
        for raw in raw_names {
            let name = author_display_name(raw);
            if self.by_name.contains_key(&name) || !staged_names.insert(name.clone()) {
                continue;
            }
            let slug = self.slugs.claim(&name);
            staged.push((name, slug));
        }

        for chunk in staged.chunks(AUTHOR_INSERT_CHUNK) {
            self.insert_chunk(connection, chunk)?;
        }
        if !staged.is_empty() {
            info!(created = staged.len(), "inserted new authors");
        }

        let mut ids = HashMap::with_capacity(raw_names.len());
        for raw in raw_names {
            let name = author_display_name(raw);
            let id = self
                .by_name
                .get(&name)
                .copied()
                .with_context(|| format!("author {name:?} has no id after insert"))?;
            ids.insert(raw.clone(), id);
        }

        Ok(AuthorResolution {
            ids,
            created: staged.len(),
        })
    }

    fn insert_chunk(&mut self, connection: &mut Connection, chunk: &[(String, String)]) -> Result<()> {
        let tx = connection
            .transaction()
            .context("failed to start author insert transaction")?;
        {
            let sql = format!(
                "INSERT INTO authors(name, slug) VALUES {} RETURNING id, name",
                values_placeholders(chunk.len(), 2)
            );
            let mut statement = tx.prepare(&sql)?;
            let values = chunk
                .iter()
                .flat_map(|(name, slug)| [name.as_str(), slug.as_str()]);
            let rows = statement.query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, name) = row.context("failed to insert author chunk")?;
                self.by_name.insert(name, id);
            }
        }
        tx.commit().context("failed to commit author chunk")?;
        Ok(())
    }
}
