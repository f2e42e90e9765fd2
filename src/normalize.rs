use anyhow::{Context, Result};
use regex::Regex;

use crate::util::tail_chars;

const YEAR_TAIL_CHARS: usize = 100;

#[derive(Debug)]
pub struct TitleNormalizer {
    subtitle: Regex,
    edition_note: Regex,
    alternate_title: Regex,
    punctuation: Regex,
}

impl TitleNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            subtitle: Regex::new(
                r"(?i)\s*[:\-–—]\s*(роман|повесть|рассказ|рассказы|сборник|поэма|новелла|эссе|очерк).*$",
            )
            .context("failed to compile subtitle regex")?,
            edition_note: Regex::new(r"(?i)\s*\((аудиокнига|книга|издание|сборник)\)")
                .context("failed to compile edition note regex")?,
            alternate_title: Regex::new(r"(?i)\s*,?\s+или\s+")
                .context("failed to compile alternate title regex")?,
            punctuation: Regex::new(r"[^\w\s]").context("failed to compile punctuation regex")?,
        })
    }

    pub fn title(&self, title: &str) -> String {
        if title.trim().is_empty() {
            return String::new();
        }

        let title = self.subtitle.replace_all(title, "");
        let title = self.edition_note.replace_all(&title, "");
        let title = self.alternate_title.replace_all(&title, " ");
        let title = self.punctuation.replace_all(&title, " ");

        title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn author(&self, author: &str) -> String {
        author.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherYear {
    pub publisher: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug)]
pub struct PublisherYearExtractor {
    copyright: Regex,
    labelled: Regex,
    bare_year: Regex,
}

impl PublisherYearExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            copyright: Regex::new(r#"©.*?[«"]([^»"]+)[»"],?\s*([0-9]{4})"#)
                .context("failed to compile copyright regex")?,
            labelled: Regex::new(r"(?i)(?:издательство|publisher)[:\s]+([^,\n]+),?\s*([0-9]{4})")
                .context("failed to compile publisher label regex")?,
            bare_year: Regex::new(r"\b(19[0-9]{2}|20[0-9]{2})\b")
                .context("failed to compile bare year regex")?,
        })
    }

    pub fn extract(&self, description: &str) -> PublisherYear {
        if description.is_empty() {
            return PublisherYear::default();
        }

        for pattern in [&self.copyright, &self.labelled] {
            if let Some(captures) = pattern.captures(description) {
                let publisher = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|value| !value.is_empty());
                let year = captures.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
                if publisher.is_some() {
                    return PublisherYear { publisher, year };
                }
            }
        }

        let year = self
            .bare_year
            .captures(tail_chars(description, YEAR_TAIL_CHARS))
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok());

        PublisherYear {
            publisher: None,
            year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_genre_subtitles_and_edition_notes() {
        let normalizer = TitleNormalizer::new().unwrap();
        assert_eq!(normalizer.title("Мастер и Маргарита: роман"), "мастер и маргарита");
        assert_eq!(normalizer.title("Отцы и дети – Роман в двух частях"), "отцы и дети");
        assert_eq!(normalizer.title("Вий (аудиокнига)"), "вий");
        assert_eq!(normalizer.title("Вий (Книга)"), "вий");
    }

    #[test]
    fn title_collapses_alternate_titles_and_punctuation() {
        let normalizer = TitleNormalizer::new().unwrap();
        assert_eq!(
            normalizer.title("Двенадцать стульев, или Приключения"),
            "двенадцать стульев приключения"
        );
        assert_eq!(normalizer.title("  Hello,   World!  "), "hello world");
        assert_eq!(normalizer.title(""), "");
    }

    #[test]
    fn title_keeps_non_genre_subtitles() {
        let normalizer = TitleNormalizer::new().unwrap();
        assert_eq!(normalizer.title("Дюна: Мессия"), "дюна мессия");
    }

    #[test]
    fn author_is_trimmed_and_lowercased() {
        let normalizer = TitleNormalizer::new().unwrap();
        assert_eq!(normalizer.author("  Лев Толстой "), "лев толстой");
    }

    #[test]
    fn extract_prefers_copyright_notice() {
        let extractor = PublisherYearExtractor::new().unwrap();
        let found = extractor.extract(
            "Описание книги. Издательство: Другое, 1990. © ООО «Издательство АСТ», 2025",
        );
        assert_eq!(found.publisher.as_deref(), Some("Издательство АСТ"));
        assert_eq!(found.year, Some(2025));
    }

    #[test]
    fn extract_falls_back_to_publisher_label() {
        let extractor = PublisherYearExtractor::new().unwrap();
        let found = extractor.extract("Прекрасная книга.\nИздательство: Эксмо, 2019");
        assert_eq!(found.publisher.as_deref(), Some("Эксмо"));
        assert_eq!(found.year, Some(2019));

        let english = extractor.extract("Publisher: Penguin, 2003");
        assert_eq!(english.publisher.as_deref(), Some("Penguin"));
        assert_eq!(english.year, Some(2003));
    }

    #[test]
    fn extract_bare_year_only_in_description_tail() {
        let extractor = PublisherYearExtractor::new().unwrap();

        let tail = extractor.extract("История, впервые изданная в 1967 году.");
        assert_eq!(tail, PublisherYear { publisher: None, year: Some(1967) });

        let early = format!("Написано в 1967 году. {}", "Текст. ".repeat(40));
        assert_eq!(extractor.extract(&early), PublisherYear::default());
    }
}
