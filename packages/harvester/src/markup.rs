//! HTML query functions for the regulation site's pages.
//!
//! Everything that knows about element names, ids and CSS classes lives
//! here. The rest of the crate works with [`ListNode`] and the typed
//! [`RegulationRow`] values produced by this module.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::types::RegulationRow;

/// Maximum number of characters of markup kept for diagnostics.
const SNIPPET_CHARS: usize = 200;

/// Site name appended to every page title.
const SITE_TITLE_SUFFIX: &str = "-全國法規資料庫";

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static CATALOG_ROOT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul#tree").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static LISTING_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td a").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static BODY_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#pnLawFla").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static BODY_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#pnLawFla > div > div").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ARTICLE_NUMBER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".col-no").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ARTICLE_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".col-data").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static LAW_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#hlLawName").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static PAGE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ATTACHMENT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="LawGetFile.ashx"]"#).expect("valid selector"));

/// Navigation list capabilities the catalog builder relies on.
///
/// A value is either a list (use [`ListNode::entries`]) or one entry of a
/// list (use the remaining methods).
pub trait ListNode: Sized {
    /// Direct child entries of a list, in document order.
    fn entries(&self) -> Vec<Self>;

    /// Trimmed display name of an entry, `None` when absent or blank.
    fn name(&self) -> Option<String>;

    /// Link token of an entry.
    fn link(&self) -> Option<String>;

    /// Nested list directly under an entry.
    fn sublist(&self) -> Option<Self>;
}

impl ListNode for ElementRef<'_> {
    fn entries(&self) -> Vec<Self> {
        self.children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li")
            .collect()
    }

    fn name(&self) -> Option<String> {
        let anchor = self.select(&ANCHOR).next()?;
        let text = collect_text(anchor);
        (!text.is_empty()).then_some(text)
    }

    fn link(&self) -> Option<String> {
        self.select(&ANCHOR)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
    }

    fn sublist(&self) -> Option<Self> {
        self.children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "ul")
    }
}

/// What kind of page a fetched document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    /// A regulation page, possibly with no body rows.
    Document,
    /// A table of links to regulation pages.
    Listing,
    Unknown,
}

/// One anchor of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingAnchor {
    /// Trimmed anchor text; empty when the anchor has no text.
    pub title: String,
    pub href: Option<String>,
}

/// Parse a page body.
#[must_use]
pub fn parse_page(body: &str) -> Html {
    Html::parse_document(body)
}

/// The catalog's top-level list.
#[must_use]
pub fn catalog_root(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&CATALOG_ROOT).next()
}

/// Determine the page shape from its markup.
#[must_use]
pub fn page_shape(doc: &Html) -> PageShape {
    if doc.select(&BODY_CONTAINER).next().is_some() || attachment_count(doc) > 0 {
        PageShape::Document
    } else if doc.select(&LISTING_ANCHOR).next().is_some() {
        PageShape::Listing
    } else {
        PageShape::Unknown
    }
}

/// Number of downloadable attachment links.
#[must_use]
pub fn attachment_count(doc: &Html) -> usize {
    doc.select(&ATTACHMENT_LINK).count()
}

/// All anchors inside table cells, in document order.
#[must_use]
pub fn listing_anchors(doc: &Html) -> Vec<ListingAnchor> {
    doc.select(&LISTING_ANCHOR)
        .map(|anchor| ListingAnchor {
            title: collect_text(anchor),
            href: anchor.value().attr("href").map(|h| h.trim().to_string()),
        })
        .collect()
}

/// Structural rows of a regulation body, classified in document order.
#[must_use]
pub fn regulation_rows(doc: &Html) -> Vec<RegulationRow> {
    doc.select(&BODY_ROW).map(classify_row).collect()
}

/// The regulation's own title as shown on its page.
///
/// Prefers the law-name heading and falls back to the page title without
/// the site suffix.
#[must_use]
pub fn document_title(doc: &Html) -> Option<String> {
    let heading = doc
        .select(&LAW_NAME)
        .next()
        .map(collect_text)
        .filter(|name| !name.is_empty());

    heading.or_else(|| {
        let title = collect_text(doc.select(&PAGE_TITLE).next()?);
        let title = title.strip_suffix(SITE_TITLE_SUFFIX).unwrap_or(title.as_str()).trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}

/// Classify one body row by its CSS markers.
#[must_use]
pub fn classify_row(row: ElementRef<'_>) -> RegulationRow {
    if let Some((level, heading)) = find_heading(row) {
        let title = collect_text(heading);
        return match level {
            1 => RegulationRow::Part { title },
            2 => RegulationRow::Chapter { title },
            _ => RegulationRow::Section { title },
        };
    }

    let number = row
        .select(&ARTICLE_NUMBER)
        .flat_map(text_fragments)
        .next();
    let fragments: Vec<String> = row
        .select(&ARTICLE_TEXT)
        .flat_map(text_fragments)
        .collect();

    if number.is_none() && fragments.is_empty() {
        return RegulationRow::Unrecognized {
            snippet: snippet(row),
        };
    }

    RegulationRow::Article {
        number,
        text: fragments.join("\n"),
    }
}

/// Heading level from `h3 char-N` classes on the row or a descendant.
fn find_heading(row: ElementRef<'_>) -> Option<(u8, ElementRef<'_>)> {
    row.descendants().filter_map(ElementRef::wrap).find_map(|el| {
        let mut is_h3 = false;
        let mut level = None;
        for class in el.value().classes() {
            match class {
                "h3" => is_h3 = true,
                "char-1" => level = Some(1),
                "char-2" => level = Some(2),
                "char-3" => level = Some(3),
                _ => {}
            }
        }
        match (is_h3, level) {
            (true, Some(level)) => Some((level, el)),
            _ => None,
        }
    })
}

/// Non-empty trimmed text nodes under an element.
fn text_fragments(el: ElementRef<'_>) -> impl Iterator<Item = String> + '_ {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// All text under an element, trimmed.
fn collect_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn snippet(el: ElementRef<'_>) -> String {
    let html = el.html();
    match html.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}…", &html[..idx]),
        None => html,
    }
}
