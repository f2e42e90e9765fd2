use anyhow::Result;

use crate::normalize::{PublisherYearExtractor, TitleNormalizer};
use crate::source::SourceRow;
use crate::util::truncate_chars;

const AUDIOBOOK_URL_MARKER: &str = "/audiobook/";

const NAME_MAX_CHARS: usize = 500;
const DESCRIPTION_MAX_CHARS: usize = 50_000;
const URL_MAX_CHARS: usize = 1_000;
const FORMATS_MAX_CHARS: usize = 500;
const PUBLISHER_MAX_CHARS: usize = 255;
const AUTHOR_NORMALIZED_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct TextEditionRecord {
    pub external_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub url: String,
    pub image_url: Option<String>,
    pub formats: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub normalized_key: String,
    pub author_normalized: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextRow {
    Audio,
    Edition(TextEditionRecord),
}

pub struct TextRowConverter {
    normalizer: TitleNormalizer,
    extractor: PublisherYearExtractor,
}

impl TextRowConverter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            normalizer: TitleNormalizer::new()?,
            extractor: PublisherYearExtractor::new()?,
        })
    }

    pub fn convert(&self, row: &SourceRow) -> Result<TextRow> {
        if row.url.contains(AUDIOBOOK_URL_MARKER) {
            return Ok(TextRow::Audio);
        }

        let external_id = row.external_id()?;
        let publisher_year = self.extractor.extract(&row.description);
        let normalized_key = self.normalizer.title(&row.name);
        let author_normalized = self.normalizer.author(&row.brand);

        Ok(TextRow::Edition(TextEditionRecord {
            external_id,
            name: truncate_chars(&row.name, NAME_MAX_CHARS).to_string(),
            description: capped(&row.description, DESCRIPTION_MAX_CHARS),
            price: parse_price(&row.price),
            url: truncate_chars(&row.url, URL_MAX_CHARS).to_string(),
            image_url: capped(&row.image, URL_MAX_CHARS),
            formats: row
                .fragments()
                .formats
                .and_then(|formats| capped(&formats, FORMATS_MAX_CHARS)),
            publisher: publisher_year
                .publisher
                .and_then(|publisher| capped(&publisher, PUBLISHER_MAX_CHARS)),
            year: publisher_year.year,
            normalized_key: truncate_chars(&normalized_key, NAME_MAX_CHARS).to_string(),
            author_normalized: truncate_chars(&author_normalized, AUTHOR_NORMALIZED_MAX_CHARS)
                .to_string(),
        }))
    }
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|price| price.is_finite())
}

fn capped(value: &str, max_chars: usize) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(truncate_chars(value, max_chars).to_string())
    }
}
