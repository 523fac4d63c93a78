//! Core data types for the harvester.
//!
//! These types represent the regulation catalog, the fetch work derived from
//! it, and the structured body extracted from one regulation page.

use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One entry of the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNode {
    /// Trimmed display name. Empty only for the root.
    pub name: String,
    pub kind: NodeKind,
}

/// A catalog entry either groups further entries or points at a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Category with children in document order.
    Category { children: Vec<CatalogNode> },
    /// Leaf holding a link relative to the site base URL.
    Leaf { link: String },
}

impl CatalogNode {
    /// Create the unnamed root category.
    #[must_use]
    pub fn root(children: Vec<CatalogNode>) -> Self {
        Self::category("", children)
    }

    #[must_use]
    pub fn category(name: impl Into<String>, children: Vec<CatalogNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Category { children },
        }
    }

    #[must_use]
    pub fn leaf(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Leaf { link: link.into() },
        }
    }

    /// The root is the only node without a name; it maps onto the output root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    /// Children of a category, empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[CatalogNode] {
        match &self.kind {
            NodeKind::Category { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Number of leaves below (or at) this node.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            NodeKind::Category { children } => children.iter().map(Self::leaf_count).sum(),
            NodeKind::Leaf { .. } => 1,
        }
    }

    /// Number of named categories below (or at) this node.
    #[must_use]
    pub fn category_count(&self) -> usize {
        match &self.kind {
            NodeKind::Category { children } => {
                let own = usize::from(!self.is_root());
                own + children.iter().map(Self::category_count).sum::<usize>()
            }
            NodeKind::Leaf { .. } => 0,
        }
    }
}

/// A catalog leaf resolved to an absolute URL and its storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: String,
    pub storage_dir: PathBuf,
    /// Display name of the leaf, used for diagnostics and as a fallback title.
    pub name: String,
}

/// One regulation document page to extract and persist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentTask {
    pub url: String,
    pub storage_dir: PathBuf,
    pub regulation_name: String,
}

/// One structural row of a regulation page, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegulationRow {
    /// Part heading (編). Recognized but not nested.
    Part { title: String },
    /// Chapter heading (章).
    Chapter { title: String },
    /// Section heading (節).
    Section { title: String },
    /// Article number and its text fragments joined with newlines.
    Article { number: Option<String>, text: String },
    /// No recognizable marker, number or content.
    Unrecognized { snippet: String },
}

/// Insertion-ordered string-keyed mapping.
///
/// Serializes as a map in insertion order, so persisted files keep the
/// document order of chapters, sections and articles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for Scope<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> Scope<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert a value. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Scope<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut scope = Self::new();
        for (k, v) in iter {
            scope.insert(k, v);
        }
        scope
    }
}

impl<V: Serialize> Serialize for Scope<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct ScopeVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for ScopeVisitor<V> {
    type Value = Scope<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut scope = Scope::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            scope.insert(k, v);
        }
        Ok(scope)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Scope<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScopeVisitor(PhantomData))
    }
}

/// Article number to article text.
pub type Articles = Scope<String>;

/// Contents of a chapter: articles filed directly, and sections.
pub type Chapter = Scope<ChapterEntry>;

/// Value stored under a chapter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChapterEntry {
    Article(String),
    Section(Articles),
}

/// Value stored under a top-level key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyEntry {
    Article(String),
    Chapter(Chapter),
}

/// Shape of an extracted regulation body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLayout {
    /// No structural rows (PDF-only regulations).
    Empty,
    /// Articles without chapter markers.
    Flat,
    /// Chapters holding articles.
    Chapters,
    /// Chapters holding sections (and possibly articles).
    ChaptersWithSections,
}

/// The extracted text of one regulation.
///
/// Top-level keys are chapter titles, or article numbers for documents
/// without chapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegulationBody {
    pub entries: Scope<BodyEntry>,
}

impl RegulationBody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify the body into one of the layouts the site produces.
    #[must_use]
    pub fn layout(&self) -> BodyLayout {
        let mut chapters = self
            .entries
            .values()
            .filter_map(|entry| match entry {
                BodyEntry::Chapter(chapter) => Some(chapter),
                BodyEntry::Article(_) => None,
            })
            .peekable();

        if chapters.peek().is_none() {
            return if self.is_empty() {
                BodyLayout::Empty
            } else {
                BodyLayout::Flat
            };
        }

        let has_sections = chapters.any(|chapter| {
            chapter
                .values()
                .any(|entry| matches!(entry, ChapterEntry::Section(_)))
        });
        if has_sections {
            BodyLayout::ChaptersWithSections
        } else {
            BodyLayout::Chapters
        }
    }

    /// Total number of articles at any depth.
    #[must_use]
    pub fn article_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                BodyEntry::Article(_) => 1,
                BodyEntry::Chapter(chapter) => chapter
                    .values()
                    .map(|entry| match entry {
                        ChapterEntry::Article(_) => 1,
                        ChapterEntry::Section(articles) => articles.len(),
                    })
                    .sum(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_tree() -> CatalogNode {
        CatalogNode::root(vec![
            CatalogNode::category(
                "行政",
                vec![
                    CatalogNode::leaf("總統府", "LawClass.aspx?TY=04001"),
                    CatalogNode::category(
                        "內政部",
                        vec![CatalogNode::leaf("民政目", "LawClass.aspx?TY=04002001")],
                    ),
                ],
            ),
            CatalogNode::leaf("憲法", "LawClass.aspx?TY=01"),
        ])
    }

    #[test]
    fn test_catalog_counts() {
        let tree = sample_tree();
        assert!(tree.is_root());
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.category_count(), 2);
        assert_eq!(tree.children().len(), 2);
        assert!(tree.children()[1].children().is_empty());
    }

    #[test]
    fn test_scope_insert_keeps_position() {
        let mut scope: Articles = Scope::new();
        scope.insert("1", "a".to_string());
        scope.insert("2", "b".to_string());
        let previous = scope.insert("1", "c".to_string());

        assert_eq!(previous, Some("a".to_string()));
        assert_eq!(scope.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(scope.get("1"), Some(&"c".to_string()));
    }

    #[test]
    fn test_scope_serializes_in_insertion_order() {
        let scope: Articles = [("第 10 條", "z"), ("第 2 條", "a")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#"{"第 10 條":"z","第 2 條":"a"}"#);
    }

    #[test]
    fn test_body_layouts() {
        assert_eq!(RegulationBody::new().layout(), BodyLayout::Empty);

        let mut flat = RegulationBody::new();
        flat.entries
            .insert("1", BodyEntry::Article("text".to_string()));
        assert_eq!(flat.layout(), BodyLayout::Flat);

        let mut chapter = Chapter::new();
        chapter.insert("1", ChapterEntry::Article("text".to_string()));
        let mut chaptered = RegulationBody::new();
        chaptered
            .entries
            .insert("第一章", BodyEntry::Chapter(chapter.clone()));
        assert_eq!(chaptered.layout(), BodyLayout::Chapters);

        chapter.insert("第一節", ChapterEntry::Section(Articles::new()));
        let mut sectioned = RegulationBody::new();
        sectioned.entries.insert("第一章", BodyEntry::Chapter(chapter));
        assert_eq!(sectioned.layout(), BodyLayout::ChaptersWithSections);
        assert_eq!(sectioned.article_count(), 1);
    }

    #[test]
    fn test_body_deserializes_nested_shapes() {
        let json = r#"{"第一章":{"1":"A","第一節":{"2":"B"}},"附則":"x"}"#;
        let body: RegulationBody = serde_json::from_str(json).unwrap();

        let Some(BodyEntry::Chapter(chapter)) = body.entries.get("第一章") else {
            panic!("expected chapter");
        };
        assert_eq!(chapter.get("1"), Some(&ChapterEntry::Article("A".to_string())));
        assert!(matches!(chapter.get("第一節"), Some(ChapterEntry::Section(s)) if s.len() == 1));
        assert_eq!(
            body.entries.get("附則"),
            Some(&BodyEntry::Article("x".to_string()))
        );
    }
}
