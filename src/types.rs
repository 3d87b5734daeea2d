use indexmap::IndexMap;

/// The directory of package documents declared by `META-INF/container.xml`
///
/// Rootfile locations are kept in document order; the first one is the
/// default rendition of the publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// Archive-relative paths of the package documents
    pub rootfiles: Vec<String>,
}

/// A resolved entry of the underlying ZIP archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Index of the entry inside the archive's central directory
    pub index: usize,

    /// Archive-relative path of the entry
    pub name: String,
}

/// Represents a resource item declared in the EPUB manifest
///
/// Each manifest item describes a resource that is part of the publication,
/// including its location, media type, and optional properties.
///
/// The `entry` back-reference is filled in by the reference binder. It stays
/// `None` when the href does not name an existing archive entry; this is only
/// reported when the content of the item is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// Identifier of the item, unique within its package
    pub id: String,

    /// The package-relative href as written in the package document
    pub href: String,

    /// The media type of the resource
    pub media_type: String,

    /// Space-separated property tokens, such as "cover-image" or "nav"
    pub properties: String,

    /// The archive entry holding the resource data
    pub entry: Option<ArchiveEntry>,
}

impl ManifestItem {
    /// Returns whether the space-separated properties contain the given token
    pub fn has_property(&self, token: &str) -> bool {
        self.properties.split_whitespace().any(|item| item == token)
    }
}

/// Represents an item in the EPUB spine, defining the reading order of the publication
///
/// The spine is a crucial component of an EPUB publication as it determines the recommended
/// reading order of content documents. Items can be marked as linear (part of the main reading
/// flow) or non-linear (supplementary content that may be accessed out of sequence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    ///
    /// The binder guarantees that this id exists in the manifest of the package,
    /// otherwise the whole parse fails.
    pub idref: String,

    /// Optional identifier for this spine item
    pub id: Option<String>,

    /// Optional properties associated with this spine item
    pub properties: Option<String>,

    /// Indicates whether this item is part of the linear reading order
    pub linear: bool,
}

/// The `<spine>` element of a package document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spine {
    /// Manifest id of the NCX navigation document, if any
    pub toc: Option<String>,

    /// The `page-progression-direction` attribute, if any
    pub page_progression_direction: Option<String>,

    /// Ordered itemrefs
    pub items: Vec<SpineItem>,
}

/// The publication title
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Title {
    pub id: Option<String>,

    /// The title text as written in the package document
    pub text: String,

    /// Alternate sort name ("file-as")
    pub file_as: Option<String>,

    /// Title type such as "main" or "subtitle"
    pub title_type: Option<String>,
}

/// A creator or contributor of the publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub id: Option<String>,

    pub name: String,

    /// Alternate sort name ("file-as")
    pub file_as: Option<String>,

    /// Role code, usually a MARC relator such as "aut"
    pub role: Option<String>,

    /// Display order among the creators. Contributors never carry one.
    pub display_seq: Option<u32>,
}

/// The publisher of the publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publisher {
    pub id: Option<String>,

    pub name: String,

    /// Alternate sort name ("file-as")
    pub file_as: Option<String>,
}

/// A publication identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub id: Option<String>,

    /// Identifier scheme, such as "ISBN" or "UUID"
    pub scheme: Option<String>,

    pub value: String,
}

/// A dated event, taken from `<dc:date>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatedEvent {
    /// The `opf:event` name, such as "publication" or "modification"
    pub event: Option<String>,

    pub date: String,
}

/// Where the cover manifest id of a package came from
///
/// A manifest item carrying the `cover-image` property always takes precedence
/// over a `<meta name="cover">` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSource {
    /// A manifest item whose properties contain `cover-image`
    ManifestProperty,

    /// A `<meta name="cover" content="...">` declaration
    MetaDeclaration,
}

/// A cover manifest id together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverRef {
    pub id: String,
    pub source: CoverSource,
}

/// Publication metadata of one package
///
/// Single-valued fields hold the first value found in the metadata block;
/// refinement declarations only fill fields that are still empty. Identifiers
/// and `primary_writing_mode` accumulate instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Title,
    pub language: String,
    pub identifiers: Vec<Identifier>,
    pub creators: Vec<Person>,
    pub contributors: Vec<Person>,
    pub publisher: Publisher,
    pub subject: String,
    pub description: String,
    pub events: Vec<DatedEvent>,
    pub doc_type: String,
    pub format: String,
    pub source: String,
    pub relation: String,
    pub coverage: String,
    pub rights: String,

    /// The cover manifest id, see [CoverSource] for precedence
    pub cover: Option<CoverRef>,

    /// Unrecognized `<meta>` facts, keyed by name or property, in encounter order
    pub other_tags: IndexMap<String, Vec<String>>,

    /// Values of `primary-writing-mode` declarations, in encounter order
    pub primary_writing_mode: Vec<String>,
}

impl Metadata {
    /// Returns the values of an unrecognized metadata fact
    pub fn other(&self, key: &str) -> Option<&[String]> {
        self.other_tags.get(key).map(Vec::as_slice)
    }
}

/// Non-fatal findings collected while resolving a package
///
/// Diagnostics never change the resolved model; they are returned with it
/// so callers may surface them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A refinement declaration whose property has no dedicated slot
    UnknownRefinementProperty {
        target: String,
        property: String,
        value: String,
    },

    /// A side-table entry whose key matched no metadata element
    OrphanedRefinement {
        table: &'static str,
        target: String,
        value: String,
    },

    /// A `display-seq` refinement that is not an unsigned integer
    InvalidDisplaySeq { target: String, value: String },

    /// A manifest href that does not name an archive entry
    UnresolvedManifestHref { id: String, path: String },
}

/// Represents a navigation point in an EPUB document's table of contents
///
/// Navigation points mirror the nesting of the navigation document; children
/// are exclusively owned, so the tree cannot contain cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavPoint {
    pub id: Option<String>,

    /// The `playOrder` attribute, if it is a valid number
    pub play_order: Option<usize>,

    /// The display label/title of this navigation point
    pub label: String,

    /// Content targets, as written in the `src` attributes
    pub content: Vec<String>,

    /// Child navigation points (sub-sections)
    pub children: Vec<NavPoint>,
}

/// The decoded table of contents of a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Archive path of the navigation document, `None` if the spine names none
    pub path: Option<String>,

    /// The `docTitle` of the navigation document
    pub title: String,

    pub points: Vec<NavPoint>,
}

impl Navigation {
    /// Returns whether the navigation tree has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{ManifestItem, Metadata, NavPoint, Navigation};

    fn item(properties: &str) -> ManifestItem {
        ManifestItem {
            id: "cover".to_string(),
            href: "cover.jpg".to_string(),
            media_type: "image/jpeg".to_string(),
            properties: properties.to_string(),
            entry: None,
        }
    }

    /// Test the token matching of manifest properties
    #[test]
    fn test_manifest_item_has_property() {
        assert!(item("cover-image").has_property("cover-image"));
        assert!(item("svg  cover-image").has_property("cover-image"));
        assert!(!item("cover-images").has_property("cover-image"));
        assert!(!item("").has_property("cover-image"));
    }

    /// Test the lookup of unrecognized metadata facts
    #[test]
    fn test_metadata_other() {
        let mut metadata = Metadata::default();
        metadata
            .other_tags
            .insert("calibre:series".to_string(), vec!["Dune".to_string()]);

        assert_eq!(metadata.other("calibre:series"), Some(&["Dune".to_string()][..]));
        assert_eq!(metadata.other("calibre:rating"), None);
    }

    /// Test structural equality of nested navigation points
    #[test]
    fn test_navpoint_structural_eq() {
        let child = NavPoint {
            id: Some("np-2".to_string()),
            play_order: Some(2),
            label: "Section 1.1".to_string(),
            content: vec!["s1.xhtml".to_string()],
            children: vec![],
        };
        let parent = NavPoint {
            id: Some("np-1".to_string()),
            play_order: Some(1),
            label: "Chapter 1".to_string(),
            content: vec!["c1.xhtml".to_string()],
            children: vec![child.clone()],
        };

        let mut other = parent.clone();
        assert_eq!(parent, other);

        other.children[0].label = "Section 1.2".to_string();
        assert_ne!(parent, other);

        assert!(Navigation::default().is_empty());
    }
}
