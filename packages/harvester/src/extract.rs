//! Folding classified body rows into a [`RegulationBody`].
//!
//! Rows are processed in document order. A chapter heading opens a chapter
//! scope and closes any section; a section heading opens a section inside
//! the current chapter; articles go into the innermost open scope. Bad rows
//! are recorded as warnings and skipped, so extraction always produces
//! whatever structure could be built.

use std::path::Path;

use crate::types::{Articles, BodyEntry, Chapter, ChapterEntry, RegulationBody, RegulationRow};

/// Identity of the document being extracted, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub regulation_name: &'a str,
    pub storage_dir: &'a Path,
}

/// Result of extracting one regulation body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub body: RegulationBody,
    /// Non-fatal problems, one per skipped row.
    pub warnings: Vec<String>,
}

impl Extraction {
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// Extract the nested body from classified rows. Never fails.
#[must_use]
pub fn extract_body(rows: &[RegulationRow], context: ExtractContext<'_>) -> Extraction {
    let mut folder = BodyFolder::default();

    for (index, row) in rows.iter().enumerate() {
        if let Err(warning) = folder.apply(row) {
            tracing::warn!(
                regulation_name = %context.regulation_name,
                storage_dir = %context.storage_dir.display(),
                row = index,
                "{warning}"
            );
            folder.warnings.push(format!("Row {index}: {warning}"));
        }
    }

    Extraction {
        body: folder.body,
        warnings: folder.warnings,
    }
}

/// Scope state carried across rows.
#[derive(Debug, Default)]
struct BodyFolder {
    body: RegulationBody,
    chapter: Option<String>,
    section: Option<String>,
    warnings: Vec<String>,
}

impl BodyFolder {
    fn apply(&mut self, row: &RegulationRow) -> std::result::Result<(), String> {
        match row {
            RegulationRow::Part { title } => {
                tracing::debug!(part = %title, "Part heading, not nested");
                Ok(())
            }
            RegulationRow::Chapter { title } => self.open_chapter(title),
            RegulationRow::Section { title } => self.open_section(title),
            RegulationRow::Article { number, text } => match number {
                Some(number) => self.insert_article(number, text),
                None => Err(format!("Article without number skipped: {}", preview(text))),
            },
            RegulationRow::Unrecognized { snippet } => {
                Err(format!("Unrecognized row skipped: {snippet}"))
            }
        }
    }

    fn open_chapter(&mut self, title: &str) -> std::result::Result<(), String> {
        if title.is_empty() {
            return Err("Chapter heading without title skipped".to_string());
        }
        self.section = None;
        self.chapter = None;

        let collides = match self.body.entries.get(title) {
            Some(BodyEntry::Chapter(_)) => false,
            Some(BodyEntry::Article(_)) => true,
            None => {
                self.body
                    .entries
                    .insert(title, BodyEntry::Chapter(Chapter::new()));
                false
            }
        };
        if collides {
            return Err(format!("Chapter '{title}' collides with an article number"));
        }

        self.chapter = Some(title.to_string());
        Ok(())
    }

    fn open_section(&mut self, title: &str) -> std::result::Result<(), String> {
        if title.is_empty() {
            return Err("Section heading without title skipped".to_string());
        }
        self.section = None;

        let Some(chapter) = self.current_chapter() else {
            return Err(format!("Section '{title}' outside any chapter skipped"));
        };
        let collides = match chapter.get(title) {
            Some(ChapterEntry::Section(_)) => false,
            Some(ChapterEntry::Article(_)) => true,
            None => {
                chapter.insert(title, ChapterEntry::Section(Articles::new()));
                false
            }
        };
        if collides {
            return Err(format!("Section '{title}' collides with an article number"));
        }

        self.section = Some(title.to_string());
        Ok(())
    }

    fn insert_article(&mut self, number: &str, text: &str) -> std::result::Result<(), String> {
        if self.chapter.is_none() {
            if let Some(BodyEntry::Chapter(_)) = self.body.entries.get(number) {
                return Err(format!("Article '{number}' collides with a chapter title"));
            }
            self.body
                .entries
                .insert(number, BodyEntry::Article(text.to_string()));
            return Ok(());
        }

        let section = self.section.clone();
        let Some(chapter) = self.current_chapter() else {
            return Err("Chapter scope is not open".to_string());
        };

        match section {
            Some(section) => match chapter.get_mut(&section) {
                Some(ChapterEntry::Section(articles)) => {
                    articles.insert(number, text.to_string());
                    Ok(())
                }
                _ => Err(format!("Section '{section}' is not open")),
            },
            None => {
                if let Some(ChapterEntry::Section(_)) = chapter.get(number) {
                    return Err(format!("Article '{number}' collides with a section title"));
                }
                chapter.insert(number, ChapterEntry::Article(text.to_string()));
                Ok(())
            }
        }
    }

    fn current_chapter(&mut self) -> Option<&mut Chapter> {
        let title = self.chapter.as_deref()?;
        match self.body.entries.get_mut(title) {
            Some(BodyEntry::Chapter(chapter)) => Some(chapter),
            _ => None,
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}
