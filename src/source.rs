use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::{Reader, ReaderBuilder, StringRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const FORMATS_PREFIX: &str = "Форматы:";
const FRAGMENT_PREFIX: &str = "Фрагмент:";

#[derive(Debug, Clone, Default)]
pub struct SourceRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: String,
    pub url: String,
    pub image: String,
    pub brand: String,
    pub params: String,
}

impl SourceRow {
    pub fn external_id(&self) -> Result<i64> {
        let raw = self.id.trim();
        if raw.is_empty() {
            bail!("missing required field: id");
        }
        raw.parse::<i64>()
            .with_context(|| format!("invalid id: {raw:?}"))
    }

    pub fn fragments(&self) -> ParamFragments {
        parse_params(&self.params)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamFragments {
    pub formats: Option<String>,
    pub fragment_url: Option<String>,
}

impl ParamFragments {
    pub fn format_list(&self) -> Vec<String> {
        self.formats
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn parse_params(params: &str) -> ParamFragments {
    let mut fragments = ParamFragments::default();

    for part in params.split('|') {
        let part = part.trim_start();
        if let Some(rest) = part.strip_prefix(FORMATS_PREFIX) {
            let rest = rest.trim();
            if !rest.is_empty() {
                fragments.formats = Some(rest.to_string());
            }
        } else if let Some(rest) = part.strip_prefix(FRAGMENT_PREFIX) {
            let rest = rest.trim();
            if !rest.is_empty() {
                fragments.fragment_url = Some(rest.to_string());
            }
        }
    }

    fragments
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceColumns {
    id: Option<usize>,
    name: Option<usize>,
    description: Option<usize>,
    category: Option<usize>,
    price: Option<usize>,
    url: Option<usize>,
    image: Option<usize>,
    brand: Option<usize>,
    params: Option<usize>,
}

impl SourceColumns {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let position = |name: &str| headers.iter().position(|header| header.trim() == name);
        Self {
            id: position("id"),
            name: position("name"),
            description: position("description"),
            category: position("category"),
            price: position("price"),
            url: position("url"),
            image: position("image"),
            brand: position("brand"),
            params: position("params"),
        }
    }

    pub fn read<R: Read>(reader: &mut Reader<R>) -> Result<Self> {
        let headers = reader.headers().context("failed to read header row")?;
        Ok(Self::from_headers(headers))
    }

    pub fn row(&self, record: &StringRecord) -> SourceRow {
        let field = |index: Option<usize>| {
            index
                .and_then(|index| record.get(index))
                .unwrap_or_default()
                .to_string()
        };
        SourceRow {
            id: field(self.id),
            name: field(self.name),
            description: field(self.description),
            category: field(self.category),
            price: field(self.price),
            url: field(self.url),
            image: field(self.image),
            brand: field(self.brand),
            params: field(self.params),
        }
    }
}

pub fn open_source(path: &Path) -> Result<Reader<BufReader<File>>> {
    if !path.is_file() {
        bail!("source file not found: {}", path.display());
    }

    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let has_bom = reader
        .fill_buf()
        .with_context(|| format!("failed to read {}", path.display()))?
        .starts_with(UTF8_BOM);
    if has_bom {
        reader.consume(UTF8_BOM.len());
    }

    Ok(ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader))
}

pub fn read_all(path: &Path) -> Result<Vec<csv::Result<SourceRow>>> {
    let mut reader = open_source(path)?;
    let columns = SourceColumns::read(&mut reader)?;
    Ok(reader
        .records()
        .map(|record| record.map(|record| columns.row(&record)))
        .collect())
}
