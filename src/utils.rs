use std::io::{Read, Seek};

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use quick_xml::{Reader, escape::unescape, events::Event};
use zip::ZipArchive;

use crate::{error::EpubError, types::ArchiveEntry};

/// Extracts the contents of a specified file from a ZIP archive
///
/// This function reads the raw byte data of a specified file from an EPUB file (which
/// is essentially a ZIP archive). This is a fundamental utility function for handling
/// files within an EPUB (such as OPF, NCX, container files, etc.).
///
/// ## Parameters
/// - `zip_file`: A mutable reference to a ZIP archive object
/// - `file_name`: The path to the file to extract (relative to the ZIP archive root directory)
///
/// ## Return
/// - `Ok(Vec<u8>)`: Returns a byte vector containing the file data
///   if the file content was successfully read
/// - `Err(EpubError)`: The file does not exist or an error occurred during the read operation
///
/// ## Notes
/// - The returned data is raw bytes; the caller needs to perform
///   appropriate decoding based on the file type.
/// - For text files, further decoding using the `DecodeBytes` trait is usually required.
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, EpubError> {
    let mut buffer = Vec::<u8>::new();
    match zip_file.by_name(file_name) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)?;
            Ok(buffer)
        }
        Err(err) => Err(EpubError::from(err)),
    }
}

/// Reads the entry at the given central directory index
pub fn get_entry_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    index: usize,
) -> Result<Vec<u8>, EpubError> {
    let mut file = zip_file.by_index(index)?;
    let mut buffer = Vec::<u8>::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Looks up an archive entry by its archive-relative path
///
/// The raw path is tried first. Packages in the wild sometimes percent-encode
/// hrefs of files that are stored unencoded, so the percent-decoded form is
/// tried as a fallback.
///
/// ## Return
/// - `Some(ArchiveEntry)`: The entry exists in the archive
/// - `None`: Neither the raw nor the decoded path names an entry
pub fn find_archive_entry<R: Read + Seek>(
    zip_file: &ZipArchive<R>,
    path: &str,
) -> Option<ArchiveEntry> {
    if let Some(index) = zip_file.index_for_name(path) {
        return Some(ArchiveEntry {
            index,
            name: path.to_string(),
        });
    }

    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    if decoded == path {
        return None;
    }

    zip_file
        .index_for_name(&decoded)
        .map(|index| ArchiveEntry {
            index,
            name: decoded.to_string(),
        })
}

/// Returns the directory portion of an archive-relative path
///
/// `"OEBPS/content.opf"` yields `"OEBPS"`, a path at the archive root yields `""`.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Resolves an href against a base directory inside the archive
///
/// `.` and empty segments are dropped and `..` removes the previous segment,
/// in the manner of a lexical path join. An href starting with `/` is taken
/// relative to the archive root.
///
/// ## Return
/// - `Some(String)`: The normalized archive-relative path
/// - `None`: The href climbs above the archive root
pub fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    let mut segments = Vec::<&str>::new();

    let joined = if let Some(absolute) = href.strip_prefix('/') {
        absolute.to_string()
    } else if base_dir.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", base_dir, href)
    };

    for segment in joined.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // failed to navigate up,
                // which means we're trying to escape the root directory
                segments.pop()?;
            }
            _ => segments.push(segment),
        }
    }

    Some(segments.join("/"))
}

/// Provides functionality to decode byte data into strings
///
/// This trait is primarily used to decode raw byte data (such as
/// text files read from EPUB files) into a suitable string representation.
/// It supports automatic detection of multiple encoding formats,
/// including UTF-8 (with or without BOM), UTF-16 BE, and UTF-16 LE.
///
/// ## Notes
/// - When attempting to parse a byte stream lacking a BOM (Byte Order Mark), the parsing
///   results may be unreadable; caution should be exercised when using such streams.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, EpubError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, EpubError> {
        self.as_slice().decode()
    }
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, EpubError> {
        if self.len() < 4 {
            return Err(EpubError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(EpubError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(EpubError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(EpubError::from)
            }

            // Try without BOM
            _ => {
                if let Ok(utf8_str) = String::from_utf8(self.to_vec()) {
                    return Ok(utf8_str);
                }

                if self.len() % 2 == 0 {
                    let utf16_units: Vec<u16> = self
                        .chunks_exact(2)
                        .map(|b| u16::from_be_bytes([b[0], b[1]]))
                        .collect();

                    if let Ok(utf16_str) = String::from_utf16(&utf16_units) {
                        return Ok(utf16_str);
                    }
                }

                // Final fallback
                Ok(String::from_utf8_lossy(self).to_string())
            }
        }
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// This trait normalizes various sequences of whitespace characters
/// (including spaces, tabs, newlines, etc.) in a string into a single
/// whitespace character, removing leading and trailing whitespace characters.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The attributes of the element
    ///
    /// The key is the qualified attribute name, the value is the unescaped attribute value.
    /// Entries keep document order.
    pub attributes: IndexMap<String, String>,

    /// The text content of the element
    pub text: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    ///
    /// Collects the text content of the current element and the text content of
    /// all its child elements, removing leading and trailing whitespace.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);
        result.trim().to_string()
    }

    fn collect_text(&self, result: &mut String) {
        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            child.collect_text(result);
        }
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Returns the value of an attribute by its local name, whatever its prefix
    ///
    /// `opf:file-as` and `file-as` both match the local name `file-as`.
    /// An unprefixed attribute wins over a prefixed one; among prefixed
    /// attributes the first in document order wins.
    pub fn get_local_attr(&self, local: &str) -> Option<String> {
        if let Some(value) = self.attributes.get(local) {
            return Some(value.clone());
        }

        self.attributes
            .iter()
            .find(|(key, _)| {
                key.rsplit_once(':')
                    .is_some_and(|(_, key_local)| key_local == local)
            })
            .map(|(_, value)| value.clone())
    }

    /// Returns the value of an attribute, treating an empty value as absent
    pub fn get_non_empty_attr(&self, name: &str) -> Option<String> {
        self.get_attr(name).filter(|value| !value.is_empty())
    }

    /// Find all elements with the specified name
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// XML parser used to parse XML content and build an XML element tree
///
/// Decoding is lenient about vocabulary: every element and attribute is kept
/// in the tree whatever its name, and consumers pick what they know.
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(EpubError)`: An error occurred during parsing
    pub fn parse(content: &str) -> Result<XmlElement, EpubError> {
        if content.is_empty() {
            return Err(EpubError::EmptyDataError);
        }

        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::open_element(&e);
                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        // If the stack is empty,
                        // the current element is the root element
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        } else {
                            root = Some(element);
                        }
                    }
                }

                // Self-closing element
                Ok(Event::Empty(e)) => {
                    let element = Self::open_element(&e);
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    } else {
                        root = Some(element);
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e);
                        // Skip the indentation between elements
                        if element.text.is_some() || !text.trim().is_empty() {
                            Self::push_text(element, &text);
                        }
                    }
                }

                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let entity = String::from_utf8_lossy(&e);
                        if let Some(resolved) = resolve_entity(&entity) {
                            Self::push_text(element, &resolved);
                        }
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        Self::push_text(element, &String::from_utf8_lossy(&e));
                    }
                }

                Err(err) => return Err(err.into()),

                // Ignore the following events (elements):
                // Comment, PI, Declaration, Doctype
                _ => {}
            }

            buf.clear();
        }

        root.ok_or(EpubError::EmptyDataError)
    }

    fn open_element(e: &quick_xml::events::BytesStart) -> XmlElement {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);

        if let Some(prefix) = e.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in e.attributes().flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();

            // Namespace declarations are not part of the vocabulary
            if attr_key == "xmlns" || attr_key.starts_with("xmlns:") {
                continue;
            }

            let raw_value = String::from_utf8_lossy(&attr.value);
            let attr_value = match unescape(&raw_value) {
                Ok(value) => value.to_string(),
                Err(_) => raw_value.to_string(),
            };

            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    fn push_text(element: &mut XmlElement, text: &str) {
        match &mut element.text {
            Some(existing) => existing.push_str(text),
            None => element.text = Some(text.to_string()),
        }
    }
}

/// Resolve XML entity references
///
/// Handles the five predefined entities and numeric character references.
/// Unknown named entities resolve to `None` and are dropped.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };

    char::from_u32(code).map(|c| c.to_string())
}


#[cfg(test)]
mod tests {
    use crate::{
        error::EpubError,
        utils::{
            DecodeBytes, NormalizeWhitespace, XmlReader, find_archive_entry,
            get_entry_in_zip_archive, get_file_in_zip_archive, parent_dir, resolve_entity,
            resolve_href, test_support::build_archive,
        },
    };

    /// Test with empty data
    #[test]
    fn test_decode_empty_data() {
        let data: Vec<u8> = vec![];
        let result = data.decode();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), EpubError::EmptyDataError);
    }

    /// Testing text decoding with UTF-8 BOM
    #[test]
    fn test_decode_utf8_with_bom() {
        let data: Vec<u8> = vec![0xEF, 0xBB, 0xBF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    /// Testing text decoding with UTF-16 LE BOM
    #[test]
    fn test_decode_utf16_le_with_bom() {
        let data = vec![
            0xFF, 0xFE, // BOM
            b'H', 0x00, // H
            b'e', 0x00, // e
            b'l', 0x00, // l
            b'l', 0x00, // l
            b'o', 0x00, // o
        ];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    /// Test text standardization containing various whitespace characters
    #[test]
    fn test_normalize_whitespace_trait() {
        let text = "  Hello,\tWorld!\n\nRust  ";
        assert_eq!(text.normalize_whitespace(), "Hello, World! Rust");
    }

    /// Test the lexical join of hrefs against the package directory
    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "c1.xhtml").unwrap(), "OEBPS/c1.xhtml");
        assert_eq!(resolve_href("", "c1.xhtml").unwrap(), "c1.xhtml");
        assert_eq!(
            resolve_href("OEBPS/text", "../images/a.png").unwrap(),
            "OEBPS/images/a.png"
        );
        assert_eq!(resolve_href("OEBPS", "./c1.xhtml").unwrap(), "OEBPS/c1.xhtml");
        assert_eq!(resolve_href("OEBPS", "/media/a.jpg").unwrap(), "media/a.jpg");
        assert!(resolve_href("OEBPS", "../../a.jpg").is_none());
    }

    /// Test the directory portion of rootfile locations
    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("a/b/content.opf"), "a/b");
        assert_eq!(parent_dir("content.opf"), "");
    }

    /// Test the lookup of raw and percent-encoded archive paths
    #[test]
    fn test_find_archive_entry() {
        let archive = zip::ZipArchive::new(build_archive(&[
            ("OEBPS/c1.xhtml", b"<html/>"),
            ("OEBPS/My Chapter.xhtml", b"<html/>"),
        ]))
        .unwrap();

        let entry = find_archive_entry(&archive, "OEBPS/c1.xhtml").unwrap();
        assert_eq!(entry.name, "OEBPS/c1.xhtml");

        let entry = find_archive_entry(&archive, "OEBPS/My%20Chapter.xhtml").unwrap();
        assert_eq!(entry.name, "OEBPS/My Chapter.xhtml");

        assert!(find_archive_entry(&archive, "OEBPS/missing.xhtml").is_none());
    }

    /// Test the element tree built from mixed text, entities and attributes
    #[test]
    fn test_xml_reader_text_and_entities() {
        let root = XmlReader::parse(
            r#"<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <dc:title id="t1" opf:file-as="Tom &amp; Jerry">Tom &amp; Jerry</dc:title>
                <dc:creator>Caf&#233;</dc:creator>
            </metadata>"#,
        )
        .unwrap();

        assert_eq!(root.name, "metadata");
        assert!(root.attributes.is_empty());

        let title = root.find_children_by_name("title").next().unwrap();
        assert_eq!(title.tag_name(), "dc:title");
        assert_eq!(title.text(), "Tom & Jerry");
        assert_eq!(title.get_attr("id").unwrap(), "t1");
        assert_eq!(title.get_local_attr("file-as").unwrap(), "Tom & Jerry");

        let creator = root.find_elements_by_name("creator").next().unwrap();
        assert_eq!(creator.text(), "Café");
    }

    /// Test that prefixed attributes sharing a local name resolve in document order
    #[test]
    fn test_get_local_attr_document_order() {
        let xml = r#"<creator opf:role="aut" x:role="ill" file-as="Doe">A</creator>"#;

        for _ in 0..100 {
            let element = XmlReader::parse(xml).unwrap();
            assert_eq!(element.get_local_attr("role").unwrap(), "aut");
            assert_eq!(element.get_local_attr("file-as").unwrap(), "Doe");

            let keys = element.attributes.keys().cloned().collect::<Vec<_>>();
            assert_eq!(keys, vec!["opf:role", "x:role", "file-as"]);
        }

        let element = XmlReader::parse(r#"<creator x:role="ill" opf:role="aut"/>"#).unwrap();
        assert_eq!(element.get_local_attr("role").unwrap(), "ill");
    }

    /// Test reading entries by name and by central directory index
    #[test]
    fn test_read_archive_entries() {
        let mut archive = zip::ZipArchive::new(build_archive(&[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/c1.xhtml", b"<html/>"),
        ]))
        .unwrap();

        let data = get_file_in_zip_archive(&mut archive, "mimetype").unwrap();
        assert_eq!(data, b"application/epub+zip");

        let index = archive.index_for_name("OEBPS/c1.xhtml").unwrap();
        let data = get_entry_in_zip_archive(&mut archive, index).unwrap();
        assert_eq!(data, b"<html/>");

        let result = get_file_in_zip_archive(&mut archive, "missing.xhtml");
        assert!(matches!(result, Err(EpubError::ArchiveError { .. })));
    }

    /// Test that a self-closing root element is still returned
    #[test]
    fn test_xml_reader_empty_root() {
        let root = XmlReader::parse(r#"<?xml version="1.0"?><navMap/>"#).unwrap();
        assert_eq!(root.name, "navMap");
        assert!(root.children.is_empty());
    }

    /// Test that malformed markup is reported
    #[test]
    fn test_xml_reader_malformed() {
        let result = XmlReader::parse("<package><manifest></package>");
        assert!(matches!(result, Err(EpubError::QuickXmlError { .. })));
    }

    /// Test the resolution of entity references
    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").unwrap(), "&");
        assert_eq!(resolve_entity("#x41").unwrap(), "A");
        assert_eq!(resolve_entity("#65").unwrap(), "A");
        assert!(resolve_entity("nbsp").is_none());
    }
}
