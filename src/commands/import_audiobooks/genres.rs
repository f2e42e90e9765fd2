use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

use crate::db::{rows_per_statement, values_placeholders};
use crate::slug::SlugRegistry;
use crate::util::truncate_with_ellipsis;

const GENRE_NAME_MAX_CHARS: usize = 255;
const PATH_SEPARATOR: char = '>';

type GenreKey = (String, Option<i64>);

pub fn split_category_path(raw: &str) -> Vec<String> {
    raw.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| truncate_with_ellipsis(segment, GENRE_NAME_MAX_CHARS))
        .collect()
}

#[derive(Debug, Default)]
pub struct GenreResolution {
    pub ids: HashMap<String, Vec<i64>>,
    pub created: usize,
}

#[derive(Debug)]
pub struct GenreResolver {
    by_key: HashMap<GenreKey, i64>,
    slugs: SlugRegistry,
}

impl GenreResolver {
    pub fn load(connection: &Connection) -> Result<Self> {
        let mut statement = connection
            .prepare("SELECT id, name, parent_id, slug FROM genres")
            .context("failed to prepare genre lookup")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut by_key = HashMap::new();
        let mut slugs = Vec::new();
        for row in rows {
            let (id, name, parent_id, slug) = row.context("failed to read genre row")?;
            by_key.insert((name, parent_id), id);
            slugs.push(slug);
        }

        Ok(Self {
            by_key,
            slugs: SlugRegistry::with_existing(slugs),
        })
    }

    pub fn resolve(
        &mut self,
        connection: &mut Connection,
        raw_paths: &BTreeSet<String>,
    ) -> Result<GenreResolution> {
        let staged: Vec<(&String, Vec<String>)> = raw_paths
            .iter()
            .map(|raw| (raw, split_category_path(raw)))
            .filter(|(_, segments)| !segments.is_empty())
            .collect();
        let max_depth = staged
            .iter()
            .map(|(_, segments)| segments.len())
            .max()
            .unwrap_or(0);

        let mut chains: Vec<Vec<i64>> = vec![Vec::new(); staged.len()];
        let mut created = 0;

        for depth in 0..max_depth {
            let mut seen = HashSet::new();
            let mut pending: Vec<GenreKey> = Vec::new();
            for ((_, segments), chain) in staged.iter().zip(&chains) {
                let Some(segment) = segments.get(depth) else {
                    continue;
                };
                let key = (segment.clone(), chain.last().copied());
                if !self.by_key.contains_key(&key) && seen.insert(key.clone()) {
                    pending.push(key);
                }
            }

            if !pending.is_empty() {
                created += self.insert_level(connection, &pending)?;
                debug!(depth, created = pending.len(), "inserted genre level");
            }

            for ((raw, segments), chain) in staged.iter().zip(chains.iter_mut()) {
                let Some(segment) = segments.get(depth) else {
                    continue;
                };
                let key = (segment.clone(), chain.last().copied());
                let id = self
                    .by_key
                    .get(&key)
                    .copied()
                    .with_context(|| format!("genre {segment:?} of path {raw:?} has no id"))?;
                chain.push(id);
            }
        }

        if created > 0 {
            info!(created, levels = max_depth, "inserted new genres");
        }

        let ids = staged
            .into_iter()
            .zip(chains)
            .map(|((raw, _), chain)| (raw.clone(), chain))
            .collect();
        Ok(GenreResolution { ids, created })
    }

    fn insert_level(&mut self, connection: &mut Connection, pending: &[GenreKey]) -> Result<usize> {
        let rows: Vec<(String, String, Option<i64>)> = pending
            .iter()
            .map(|(name, parent_id)| (name.clone(), self.slugs.claim(name), *parent_id))
            .collect();

        let tx = connection
            .transaction()
            .context("failed to start genre insert transaction")?;
        let mut inserted = 0;
        for chunk in rows.chunks(rows_per_statement(3)) {
            let sql = format!(
                "INSERT INTO genres(name, slug, parent_id) VALUES {} RETURNING id, name, parent_id",
                values_placeholders(chunk.len(), 3)
            );
            let mut statement = tx.prepare(&sql)?;
            let values = chunk.iter().flat_map(|(name, slug, parent_id)| {
                [
                    Value::Text(name.clone()),
                    Value::Text(slug.clone()),
                    parent_id.map_or(Value::Null, Value::Integer),
                ]
            });
            let returned = statement.query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?;
            for row in returned {
                let (id, name, parent_id) = row.context("failed to insert genre level")?;
                self.by_key.insert((name, parent_id), id);
                inserted += 1;
            }
        }
        tx.commit().context("failed to commit genre level")?;
        Ok(inserted)
    }
}
