//! Metadata decoding and refinement
//!
//! Publication metadata is resolved in two steps:
//!
//! 1. The primary decode reads the Dublin Core elements of the `<metadata>`
//!    block into a [Metadata] record, including the EPUB 2 attribute
//!    refinements (`opf:file-as`, `opf:role`, `opf:event`, `opf:scheme`).
//! 2. The refinement engine isolates the `<metadata>` block by a literal text
//!    search, extracts its `<meta>` declarations and applies them onto the
//!    record. Declarations can target elements by id (`refines="#id"`), supply
//!    whole fields through `dcterms:` terms, or carry free-form facts.
//!
//! The metadata vocabulary is open-ended. A declaration the engine has no slot
//! for never fails the parse; it lands in the generic bucket or is dropped and
//! reported through the package diagnostics.

use indexmap::IndexMap;
use log::{debug, warn};
use memchr::memmem;

use crate::{
    error::EpubError,
    types::{
        CoverRef, CoverSource, DatedEvent, Diagnostic, Identifier, Metadata, Person, Publisher,
        Title,
    },
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

/// The `name` of a `<meta>` declaration naming the cover manifest item
const COVER_NAME: &str = "cover";

/// Prefix of the term override vocabulary
const TERM_PREFIX: &str = "dcterms:";

/// Generic bucket key moved into [Metadata::primary_writing_mode]
const PRIMARY_WRITING_MODE: &str = "primary-writing-mode";

/// Decodes the primary Dublin Core elements of a `<metadata>` block
///
/// Single-valued fields keep the first non-empty element; identifiers,
/// creators, contributors and dates keep every element in document order.
/// `<meta>`, `<link>` and unknown elements are left to the refinement engine.
pub(crate) fn parse_metadata(metadata_element: &XmlElement) -> Metadata {
    let mut metadata = Metadata::default();

    for element in metadata_element.children() {
        let value = element.text().normalize_whitespace();

        match element.name.as_str() {
            "title" => {
                if metadata.title.text.is_empty() {
                    metadata.title = Title {
                        id: element.get_non_empty_attr("id"),
                        text: value,
                        file_as: local_attr(element, "file-as"),
                        title_type: None,
                    };
                } else {
                    debug!("Additional title \"{}\" is ignored.", value);
                }
            }

            "identifier" => metadata.identifiers.push(Identifier {
                id: element.get_non_empty_attr("id"),
                scheme: local_attr(element, "scheme"),
                value,
            }),

            "creator" => metadata.creators.push(parse_person(element, value)),
            "contributor" => metadata.contributors.push(parse_person(element, value)),

            "publisher" => {
                if metadata.publisher.name.is_empty() {
                    metadata.publisher = Publisher {
                        id: element.get_non_empty_attr("id"),
                        name: value,
                        file_as: local_attr(element, "file-as"),
                    };
                }
            }

            "date" => metadata.events.push(DatedEvent {
                event: local_attr(element, "event"),
                date: value,
            }),

            "language" => set_if_empty(&mut metadata.language, value),
            "subject" => set_if_empty(&mut metadata.subject, value),
            "description" => set_if_empty(&mut metadata.description, value),
            "type" => set_if_empty(&mut metadata.doc_type, value),
            "format" => set_if_empty(&mut metadata.format, value),
            "source" => set_if_empty(&mut metadata.source, value),
            "relation" => set_if_empty(&mut metadata.relation, value),
            "coverage" => set_if_empty(&mut metadata.coverage, value),
            "rights" => set_if_empty(&mut metadata.rights, value),

            _ => {}
        }
    }

    metadata
}

#[inline]
fn parse_person(element: &XmlElement, name: String) -> Person {
    Person {
        id: element.get_non_empty_attr("id"),
        name,
        file_as: local_attr(element, "file-as"),
        role: local_attr(element, "role"),
        display_seq: None,
    }
}

#[inline]
fn local_attr(element: &XmlElement, name: &str) -> Option<String> {
    element
        .get_local_attr(name)
        .map(|value| value.normalize_whitespace())
        .filter(|value| !value.is_empty())
}

#[inline]
fn set_if_empty(field: &mut String, value: String) {
    if field.is_empty() {
        *field = value;
    }
}

/// A `<meta>` element of the metadata block, before resolution
///
/// Only the five attributes relevant to refinement are kept. Absent and empty
/// attributes are both `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDeclaration {
    pub name: Option<String>,
    pub content: Option<String>,

    /// The `refines` target, including its leading `#`
    pub refines: Option<String>,
    pub property: Option<String>,

    /// Whitespace-normalized inner text
    pub text: String,
}

impl MetaDeclaration {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            name: local_attr(element, "name"),
            content: local_attr(element, "content"),
            refines: local_attr(element, "refines"),
            property: local_attr(element, "property"),
            text: element.text().normalize_whitespace(),
        }
    }

    /// The bare id of the refines target
    fn target(&self) -> Option<&str> {
        let refines = self.refines.as_deref()?;
        let target = refines.strip_prefix('#').unwrap_or(refines);
        (!target.is_empty()).then_some(target)
    }
}

/// Extracts the `<meta>` declarations of a package document
///
/// The interior of the `<metadata>` block is located by a literal search for
/// its opening and closing tags and re-wrapped in a bare `<metadata>` element,
/// so vocabulary prefixes declared elsewhere in the document do not matter.
/// Every element other than `<meta>` is ignored.
///
/// A document whose metadata block cannot be located yields no declarations.
///
/// ## Parameters
/// - `rootfile`: The archive path of the package document, used in errors
/// - `content`: The decoded text of the package document
pub fn extract_declarations(
    rootfile: &str,
    content: &str,
) -> Result<Vec<MetaDeclaration>, EpubError> {
    let interior = match isolate_metadata_block(content.as_bytes()) {
        Some(interior) => interior,
        None => {
            warn!(
                "Unable to isolate the metadata block of \"{}\", refinements are skipped.",
                rootfile
            );
            return Ok(vec![]);
        }
    };

    if interior.trim().is_empty() {
        return Ok(vec![]);
    }

    let document = format!("<metadata>{}</metadata>", interior);
    let root = XmlReader::parse(&document).map_err(|err| EpubError::decoding(rootfile, err))?;

    Ok(root
        .find_elements_by_name("meta")
        .map(MetaDeclaration::from_element)
        .collect())
}

/// Returns the text between the opening and closing metadata tags
fn isolate_metadata_block(content: &[u8]) -> Option<&str> {
    const OPEN_TAG: &[u8] = b"<metadata";
    const CLOSE_TAG: &[u8] = b"</metadata>";

    // `<metadata` must not match a longer tag name such as `<metadataX`
    let open = memmem::find_iter(content, OPEN_TAG).find(|&start| {
        matches!(
            content.get(start + OPEN_TAG.len()),
            Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/')
        )
    })?;

    let tag_end = open + memchr::memchr(b'>', &content[open..])?;
    if content[tag_end - 1] == b'/' {
        // <metadata/>
        return Some("");
    }

    let interior_start = tag_end + 1;
    let interior_end = interior_start + memmem::find(&content[interior_start..], CLOSE_TAG)?;

    std::str::from_utf8(&content[interior_start..interior_end]).ok()
}

/// A refinement side table, keyed by target id or term name
///
/// A later declaration of a key replaces an earlier one. Lookups mark their key as consumed so
/// the keys that matched no element can be reported afterwards.
#[derive(Debug)]
struct SideTable {
    name: &'static str,
    entries: IndexMap<String, (Vec<String>, bool)>,
}

impl SideTable {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: IndexMap::new(),
        }
    }

    fn insert(&mut self, key: &str, value: String) {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| (Vec::new(), false))
            .0
            .push(value);
    }

    /// Returns the last declared value of a key
    fn get(&mut self, key: Option<&str>) -> Option<String> {
        self.get_all(key)?.pop()
    }

    /// Returns every value of a key, in declaration order
    fn get_all(&mut self, key: Option<&str>) -> Option<Vec<String>> {
        // Unidentified elements never receive refinements
        let key = key.filter(|key| !key.is_empty())?;
        let (values, consumed) = self.entries.get_mut(key)?;
        *consumed = true;
        Some(values.clone())
    }

    fn report_orphans(&self, diagnostics: &mut Vec<Diagnostic>) {
        for (key, (values, consumed)) in self.entries.iter() {
            if *consumed {
                continue;
            }

            for value in values {
                debug!(
                    "The {} refinement \"{}\" of \"{}\" matches no metadata element.",
                    self.name, value, key
                );
                diagnostics.push(Diagnostic::OrphanedRefinement {
                    table: self.name,
                    target: key.clone(),
                    value: value.clone(),
                });
            }
        }
    }
}

/// The classified declarations of one metadata block
struct Refinements {
    cover: Option<String>,
    other_tags: IndexMap<String, Vec<String>>,
    file_as: SideTable,
    role: SideTable,
    display_seq: SideTable,
    title_type: SideTable,
    term_override: SideTable,
}

impl Refinements {
    /// Sorts every declaration into the cover candidate, the generic bucket
    /// or one of the side tables
    fn classify(declarations: &[MetaDeclaration], diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut refinements = Self {
            cover: None,
            other_tags: IndexMap::new(),
            file_as: SideTable::new("file-as"),
            role: SideTable::new("role"),
            display_seq: SideTable::new("display-seq"),
            title_type: SideTable::new("title-type"),
            term_override: SideTable::new("term"),
        };

        for declaration in declarations {
            if let (Some(name), Some(content)) = (&declaration.name, &declaration.content) {
                if name == COVER_NAME {
                    refinements.cover = Some(content.clone());
                } else {
                    refinements.push_other(name, content.clone());
                }
            }

            let Some(property) = declaration.property.as_deref() else {
                continue;
            };

            match (declaration.refines.is_some(), declaration.target()) {
                (_, Some(target)) => refinements.classify_refinement(
                    target,
                    property,
                    declaration.text.clone(),
                    diagnostics,
                ),
                (true, None) => debug!(
                    "Dropped the refinement \"{}\": the refines target is empty.",
                    property
                ),
                (false, None) => refinements.push_other(property, declaration.text.clone()),
            }
        }

        refinements
    }

    fn classify_refinement(
        &mut self,
        target: &str,
        property: &str,
        value: String,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        match property {
            "file-as" => self.file_as.insert(target, value),
            "role" => self.role.insert(target, value),
            "display-seq" => self.display_seq.insert(target, value),
            "title-type" => self.title_type.insert(target, value),

            _ => match property.strip_prefix(TERM_PREFIX) {
                Some(term) if !term.is_empty() => self.term_override.insert(term, value),
                _ => {
                    debug!(
                        "Dropped the refinement \"{}\" of \"{}\": unknown property.",
                        property, target
                    );
                    diagnostics.push(Diagnostic::UnknownRefinementProperty {
                        target: target.to_string(),
                        property: property.to_string(),
                        value,
                    });
                }
            },
        }
    }

    fn push_other(&mut self, key: &str, value: String) {
        if value.is_empty() {
            return;
        }

        self.other_tags
            .entry(key.to_string())
            .or_default()
            .push(value);
    }
}

/// Applies the `<meta>` declarations of a package onto its metadata record
///
/// Fields populated by the primary decode are never overwritten; side tables
/// only fill what is still empty. Identifiers and the primary writing mode
/// accumulate instead. Creators and contributors are refined in document order.
///
/// A cover candidate from a `<meta name="cover">` declaration is only taken
/// when no manifest item flagged `cover-image` already set the cover. A repeated
/// declaration, of the cover or of a side-table key, replaces the earlier one.
///
/// ## Parameters
/// - `metadata`: The record produced by [parse_metadata]
/// - `declarations`: The declarations produced by [extract_declarations]
/// - `unique_identifier`: The `unique-identifier` attribute of the package
/// - `diagnostics`: Receives dropped and orphaned refinements
pub fn refine_metadata(
    metadata: &mut Metadata,
    declarations: &[MetaDeclaration],
    unique_identifier: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut refinements = Refinements::classify(declarations, diagnostics);

    if metadata.cover.is_none() {
        metadata.cover = refinements.cover.take().map(|id| CoverRef {
            id,
            source: CoverSource::MetaDeclaration,
        });
    }

    apply_term_overrides(metadata, &mut refinements.term_override, unique_identifier);

    let title = &mut metadata.title;
    let title_file_as = refinements
        .file_as
        .get(title.id.as_deref())
        .or_else(|| refinements.file_as.get(Some("title")));
    fill(&mut title.file_as, title_file_as);
    fill(
        &mut title.title_type,
        refinements.title_type.get(title.id.as_deref()),
    );

    let publisher = &mut metadata.publisher;
    let publisher_file_as = refinements
        .file_as
        .get(publisher.id.as_deref())
        .or_else(|| refinements.file_as.get(Some("publisher")));
    fill(&mut publisher.file_as, publisher_file_as);

    // Document order, not declaration order
    for creator in metadata.creators.iter_mut() {
        refine_person(creator, &mut refinements);
        apply_display_seq(creator, &mut refinements.display_seq, diagnostics);
    }

    for contributor in metadata.contributors.iter_mut() {
        refine_person(contributor, &mut refinements);
    }

    for table in [
        &refinements.file_as,
        &refinements.role,
        &refinements.display_seq,
        &refinements.title_type,
        &refinements.term_override,
    ] {
        table.report_orphans(diagnostics);
    }

    if let Some(modes) = refinements.other_tags.shift_remove(PRIMARY_WRITING_MODE) {
        metadata.primary_writing_mode.extend(modes);
    }

    for (key, values) in refinements.other_tags {
        metadata.other_tags.entry(key).or_default().extend(values);
    }
}

/// Sets an optional field only if it is still empty
#[inline]
fn fill(field: &mut Option<String>, value: Option<String>) {
    if field.is_none() {
        *field = value;
    }
}

fn apply_term_overrides(metadata: &mut Metadata, terms: &mut SideTable, unique_identifier: &str) {
    if let Some(title) = terms.get(Some("title")) {
        set_if_empty(&mut metadata.title.text, title);
    }

    if let Some(language) = terms.get(Some("language")) {
        set_if_empty(&mut metadata.language, language);
    }

    let mut identifiers = terms.get_all(Some("identifier")).unwrap_or_default();
    if unique_identifier != "identifier" {
        identifiers.extend(terms.get_all(Some(unique_identifier)).unwrap_or_default());
    }

    metadata
        .identifiers
        .extend(identifiers.into_iter().map(|value| Identifier {
            id: None,
            scheme: None,
            value,
        }));
}

fn refine_person(person: &mut Person, refinements: &mut Refinements) {
    fill(
        &mut person.file_as,
        refinements.file_as.get(person.id.as_deref()),
    );
    fill(&mut person.role, refinements.role.get(person.id.as_deref()));
}

fn apply_display_seq(
    creator: &mut Person,
    display_seq: &mut SideTable,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(value) = display_seq.get(creator.id.as_deref()) else {
        return;
    };

    if creator.display_seq.is_some() {
        return;
    }

    match value.parse::<u32>() {
        Ok(seq) => creator.display_seq = Some(seq),
        Err(_) => {
            let target = creator.id.clone().unwrap_or_default();
            warn!(
                "The display-seq \"{}\" of \"{}\" is not an unsigned integer.",
                value, target
            );
            diagnostics.push(Diagnostic::InvalidDisplaySeq { target, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{
            MetaDeclaration, extract_declarations, isolate_metadata_block, parse_metadata,
            refine_metadata,
        },
        types::{CoverRef, CoverSource, Diagnostic, Metadata},
        utils::XmlReader,
    };

    fn package(metadata: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="pub-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
{}
  </metadata>
  <manifest/>
  <spine/>
</package>"#,
            metadata
        )
    }

    /// Runs the primary decode and the refinement engine over a metadata block
    fn resolve(metadata: &str) -> (Metadata, Vec<Diagnostic>) {
        let content = package(metadata);
        let root = XmlReader::parse(&content).unwrap();
        let element = root.find_children_by_name("metadata").next().unwrap();

        let mut metadata = parse_metadata(element);
        let declarations = extract_declarations("content.opf", &content).unwrap();
        let mut diagnostics = vec![];
        refine_metadata(&mut metadata, &declarations, "pub-id", &mut diagnostics);

        (metadata, diagnostics)
    }

    /// Test the primary decode of Dublin Core elements
    #[test]
    fn test_parse_metadata_dublin_core() {
        let (metadata, _) = resolve(
            r#"
    <dc:identifier id="pub-id" opf:scheme="ISBN">9780000000000</dc:identifier>
    <dc:title>The   Great
        Novel</dc:title>
    <dc:title>Ignored Second Title</dc:title>
    <dc:language>en</dc:language>
    <dc:creator opf:role="aut" opf:file-as="Doe, Jane">Jane Doe</dc:creator>
    <dc:contributor>Bob Editor</dc:contributor>
    <dc:publisher opf:file-as="House, The">The House</dc:publisher>
    <dc:subject>Fiction</dc:subject>
    <dc:description>A &lt;short&gt; story.</dc:description>
    <dc:date opf:event="publication">2001-02-03</dc:date>
    <dc:date>2002</dc:date>
    <dc:type>Text</dc:type>
    <dc:format>application/epub+zip</dc:format>
    <dc:source>Print</dc:source>
    <dc:relation>Series</dc:relation>
    <dc:coverage>World</dc:coverage>
    <dc:rights>Public domain</dc:rights>"#,
        );

        assert_eq!(metadata.title.text, "The Great Novel");
        assert_eq!(metadata.language, "en");
        assert_eq!(metadata.identifiers.len(), 1);
        assert_eq!(metadata.identifiers[0].id.as_deref(), Some("pub-id"));
        assert_eq!(metadata.identifiers[0].scheme.as_deref(), Some("ISBN"));
        assert_eq!(metadata.identifiers[0].value, "9780000000000");

        assert_eq!(metadata.creators[0].name, "Jane Doe");
        assert_eq!(metadata.creators[0].role.as_deref(), Some("aut"));
        assert_eq!(metadata.creators[0].file_as.as_deref(), Some("Doe, Jane"));
        assert_eq!(metadata.contributors[0].name, "Bob Editor");
        assert_eq!(metadata.publisher.name, "The House");
        assert_eq!(metadata.publisher.file_as.as_deref(), Some("House, The"));

        assert_eq!(metadata.subject, "Fiction");
        assert_eq!(metadata.description, "A <short> story.");
        assert_eq!(metadata.events.len(), 2);
        assert_eq!(metadata.events[0].event.as_deref(), Some("publication"));
        assert_eq!(metadata.events[0].date, "2001-02-03");
        assert_eq!(metadata.events[1].event, None);
        assert_eq!(metadata.doc_type, "Text");
        assert_eq!(metadata.format, "application/epub+zip");
        assert_eq!(metadata.source, "Print");
        assert_eq!(metadata.relation, "Series");
        assert_eq!(metadata.coverage, "World");
        assert_eq!(metadata.rights, "Public domain");
    }

    /// Test that a file-as refinement reaches the title it targets
    #[test]
    fn test_refine_title_file_as() {
        let (metadata, diagnostics) = resolve(
            r##"
    <dc:title id="t1">Jane's Book</dc:title>
    <meta refines="#t1" property="file-as">Doe, Jane</meta>
    <meta refines="#t1" property="title-type">main</meta>"##,
        );

        assert_eq!(metadata.title.text, "Jane's Book");
        assert_eq!(metadata.title.file_as.as_deref(), Some("Doe, Jane"));
        assert_eq!(metadata.title.title_type.as_deref(), Some("main"));
        assert!(diagnostics.is_empty());
    }

    /// Test the literal title and publisher keys of the file-as table
    #[test]
    fn test_refine_literal_keys() {
        let (metadata, _) = resolve(
            r##"
    <dc:title>Untitled</dc:title>
    <dc:publisher>Press</dc:publisher>
    <meta refines="#title" property="file-as">Untitled, The</meta>
    <meta refines="#publisher" property="file-as">Press, The</meta>"##,
        );

        assert_eq!(metadata.title.file_as.as_deref(), Some("Untitled, The"));
        assert_eq!(metadata.publisher.file_as.as_deref(), Some("Press, The"));
    }

    /// Test role, file-as and display-seq on creators and contributors
    #[test]
    fn test_refine_people() {
        let (metadata, diagnostics) = resolve(
            r##"
    <meta refines="#c2" property="display-seq">1</meta>
    <meta refines="#c1" property="display-seq">2</meta>
    <meta refines="#c1" property="role" scheme="marc:relators">aut</meta>
    <meta refines="#c1" property="file-as">Doe, Jane</meta>
    <meta refines="#ed" property="role">edt</meta>
    <meta refines="#ed" property="display-seq">3</meta>
    <dc:creator id="c1">Jane Doe</dc:creator>
    <dc:creator id="c2">John Roe</dc:creator>
    <dc:creator>Anonymous</dc:creator>
    <dc:contributor id="ed">Bob Editor</dc:contributor>"##,
        );

        let creators = &metadata.creators;
        assert_eq!(creators[0].name, "Jane Doe");
        assert_eq!(creators[0].role.as_deref(), Some("aut"));
        assert_eq!(creators[0].file_as.as_deref(), Some("Doe, Jane"));
        assert_eq!(creators[0].display_seq, Some(2));
        assert_eq!(creators[1].display_seq, Some(1));
        assert_eq!(creators[2].display_seq, None);
        assert_eq!(creators[2].role, None);

        let editor = &metadata.contributors[0];
        assert_eq!(editor.role.as_deref(), Some("edt"));
        assert_eq!(editor.display_seq, None);

        // display-seq is never applied to contributors
        assert_eq!(
            diagnostics,
            vec![Diagnostic::OrphanedRefinement {
                table: "display-seq",
                target: "ed".to_string(),
                value: "3".to_string(),
            }]
        );
    }

    /// Test that attributes of the primary body win over refinements
    #[test]
    fn test_refine_first_writer_wins() {
        let (metadata, diagnostics) = resolve(
            r##"
    <dc:creator id="c1" opf:file-as="Body, Value" opf:role="ill">Jane Doe</dc:creator>
    <meta refines="#c1" property="file-as">Meta, Value</meta>
    <meta refines="#c1" property="file-as">Second, Value</meta>
    <meta refines="#c1" property="role">aut</meta>"##,
        );

        assert_eq!(metadata.creators[0].file_as.as_deref(), Some("Body, Value"));
        assert_eq!(metadata.creators[0].role.as_deref(), Some("ill"));
        assert!(diagnostics.is_empty());
    }

    /// Test that a repeated declaration replaces the earlier one
    #[test]
    fn test_refine_last_declaration_wins() {
        let (metadata, diagnostics) = resolve(
            r##"
    <meta name="cover" content="first"/>
    <meta name="cover" content="second"/>
    <dc:creator id="c1">Jane Doe</dc:creator>
    <meta refines="#c1" property="file-as">One</meta>
    <meta refines="#c1" property="file-as">Two</meta>
    <meta refines="#c1" property="role">aut</meta>
    <meta refines="#c1" property="role">edt</meta>
    <meta refines="#x" property="dcterms:title">First Title</meta>
    <meta refines="#x" property="dcterms:title">Second Title</meta>"##,
        );

        assert_eq!(
            metadata.cover,
            Some(CoverRef {
                id: "second".to_string(),
                source: CoverSource::MetaDeclaration,
            })
        );
        assert_eq!(metadata.creators[0].file_as.as_deref(), Some("Two"));
        assert_eq!(metadata.creators[0].role.as_deref(), Some("edt"));
        assert_eq!(metadata.title.text, "Second Title");
        assert!(diagnostics.is_empty());
    }

    /// Test that elements without id never receive refinements
    #[test]
    fn test_refine_empty_id_never_matches() {
        let (metadata, diagnostics) = resolve(
            r##"
    <dc:creator id="">Jane Doe</dc:creator>
    <meta refines="#" property="file-as">Doe, Jane</meta>"##,
        );

        assert_eq!(metadata.creators[0].id, None);
        assert_eq!(metadata.creators[0].file_as, None);
        assert!(metadata.other_tags.is_empty());
        assert!(diagnostics.is_empty());
    }

    /// Test term overrides for empty fields and identifiers
    #[test]
    fn test_refine_term_overrides() {
        let (metadata, diagnostics) = resolve(
            r##"
    <dc:identifier id="pub-id">urn:uuid:1</dc:identifier>
    <dc:language>fr</dc:language>
    <meta refines="#x" property="dcterms:title">Override Title</meta>
    <meta refines="#x" property="dcterms:language">en</meta>
    <meta refines="#x" property="dcterms:identifier">isbn:1</meta>
    <meta refines="#x" property="dcterms:identifier">isbn:2</meta>
    <meta refines="#x" property="dcterms:pub-id">urn:uuid:2</meta>
    <meta refines="#x" property="dcterms:modified">2020-01-01</meta>"##,
        );

        assert_eq!(metadata.title.text, "Override Title");
        assert_eq!(metadata.language, "fr");

        let identifiers: Vec<_> = metadata
            .identifiers
            .iter()
            .map(|identifier| identifier.value.as_str())
            .collect();
        assert_eq!(identifiers, vec!["urn:uuid:1", "isbn:1", "isbn:2", "urn:uuid:2"]);

        assert_eq!(
            diagnostics,
            vec![Diagnostic::OrphanedRefinement {
                table: "term",
                target: "modified".to_string(),
                value: "2020-01-01".to_string(),
            }]
        );
    }

    /// Test that unknown refinement properties are dropped with a diagnostic
    #[test]
    fn test_refine_unknown_property() {
        let (metadata, diagnostics) = resolve(
            r##"
    <dc:title id="t1">Title</dc:title>
    <meta refines="#t1" property="alternate-script" xml:lang="ja">タイトル</meta>
    <meta refines="#t1" property="vendor:rating" unknown-attr="x">5</meta>"##,
        );

        assert!(metadata.other_tags.is_empty());
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::UnknownRefinementProperty {
                    target: "t1".to_string(),
                    property: "alternate-script".to_string(),
                    value: "タイトル".to_string(),
                },
                Diagnostic::UnknownRefinementProperty {
                    target: "t1".to_string(),
                    property: "vendor:rating".to_string(),
                    value: "5".to_string(),
                },
            ]
        );
    }

    /// Test the generic bucket and the primary writing mode
    #[test]
    fn test_refine_generic_bucket() {
        let (metadata, _) = resolve(
            r#"
    <meta name="calibre:series" content="Dune"/>
    <meta property="rendition:layout">pre-paginated</meta>
    <meta name="calibre:series" content="Dune Messiah"/>
    <meta name="primary-writing-mode" content="horizontal-rl"/>
    <meta property="primary-writing-mode">vertical-rl</meta>
    <meta property="dcterms:modified">2020-01-01T00:00:00Z</meta>
    <meta name="empty" content=""/>"#,
        );

        let keys: Vec<_> = metadata.other_tags.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["calibre:series", "rendition:layout", "dcterms:modified"]
        );
        assert_eq!(
            metadata.other("calibre:series").unwrap(),
            &["Dune".to_string(), "Dune Messiah".to_string()]
        );
        assert_eq!(
            metadata.primary_writing_mode,
            vec!["horizontal-rl", "vertical-rl"]
        );
        assert_eq!(metadata.other("primary-writing-mode"), None);
        assert_eq!(metadata.other("empty"), None);
    }

    /// Test that a meta cover only fills an empty cover slot
    #[test]
    fn test_refine_cover_precedence() {
        let content = package(r#"<meta name="cover" content="meta-cover"/>"#);
        let declarations = extract_declarations("content.opf", &content).unwrap();

        let mut metadata = Metadata::default();
        refine_metadata(&mut metadata, &declarations, "pub-id", &mut vec![]);
        assert_eq!(
            metadata.cover,
            Some(CoverRef {
                id: "meta-cover".to_string(),
                source: CoverSource::MetaDeclaration,
            })
        );

        let manifest_cover = CoverRef {
            id: "manifest-cover".to_string(),
            source: CoverSource::ManifestProperty,
        };
        let mut metadata = Metadata {
            cover: Some(manifest_cover.clone()),
            ..Metadata::default()
        };
        refine_metadata(&mut metadata, &declarations, "pub-id", &mut vec![]);
        assert_eq!(metadata.cover, Some(manifest_cover));
    }

    /// Test that the declaration order does not change the resolved record
    #[test]
    fn test_refine_deterministic() {
        let forward = r##"
    <dc:creator id="a">A</dc:creator>
    <dc:creator id="b">B</dc:creator>
    <meta refines="#a" property="role">aut</meta>
    <meta refines="#b" property="role">ill</meta>"##;
        let backward = r##"
    <dc:creator id="a">A</dc:creator>
    <dc:creator id="b">B</dc:creator>
    <meta refines="#b" property="role">ill</meta>
    <meta refines="#a" property="role">aut</meta>"##;

        assert_eq!(resolve(forward).0, resolve(backward).0);
    }

    /// Test the literal isolation of the metadata block
    #[test]
    fn test_isolate_metadata_block() {
        let content = br#"<package><metadataExtra/><metadata xmlns:dc="x"><meta name="a" content="b"/></metadata></package>"#;
        assert_eq!(
            isolate_metadata_block(content),
            Some(r#"<meta name="a" content="b"/>"#)
        );

        assert_eq!(isolate_metadata_block(b"<package><metadata/></package>"), Some(""));
        assert_eq!(isolate_metadata_block(b"<package><opf:metadata></opf:metadata></package>"), None);
        assert_eq!(isolate_metadata_block(b"<package><metadata></package>"), None);
    }

    /// Test that declarations keep only the attributes relevant to refinement
    #[test]
    fn test_extract_declarations() {
        let content = package(
            r##"<dc:title>T</dc:title><meta refines="#t" property="file-as" scheme="s" id="m1">  T,   The </meta>"##,
        );
        let declarations = extract_declarations("content.opf", &content).unwrap();

        assert_eq!(
            declarations,
            vec![MetaDeclaration {
                name: None,
                content: None,
                refines: Some("#t".to_string()),
                property: Some("file-as".to_string()),
                text: "T, The".to_string(),
            }]
        );
    }

    /// Test that a document without metadata block yields no declarations
    #[test]
    fn test_extract_declarations_missing_block() {
        let declarations =
            extract_declarations("content.opf", "<package><manifest/></package>").unwrap();
        assert!(declarations.is_empty());
    }
}
