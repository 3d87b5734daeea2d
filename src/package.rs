//! Package document parsing and reference binding
//!
//! A package document (the OPF file named by a rootfile) is decoded into its
//! raw sections first: the primary metadata record, the manifest and the spine.
//! The binder then cross-references them: every manifest href is resolved to an
//! archive entry and every spine itemref is bound to a manifest item.
//!
//! Decoding of the manifest and spine ignores attributes and child elements it
//! does not know, since packages in the wild carry publisher-specific extensions.

use std::{
    collections::HashMap,
    io::{Read, Seek},
};

use log::warn;
use zip::ZipArchive;

use crate::{
    error::EpubError,
    metadata::parse_metadata,
    types::{
        CoverRef, CoverSource, Diagnostic, ManifestItem, Metadata, Navigation, Spine, SpineItem,
    },
    utils::{XmlElement, XmlReader, find_archive_entry, parent_dir, resolve_href},
};

/// One publication rendition, as declared by a rootfile of the container
///
/// A package owns its manifest items and spine entries. Once the document model
/// is built the package is never mutated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Archive path of the package document
    pub rootfile: String,

    /// The `unique-identifier` attribute of the package, the id of the
    /// identifier element that uniquely names the publication
    pub unique_identifier: String,

    pub metadata: Metadata,

    /// Manifest items in document order
    pub manifest: Vec<ManifestItem>,

    pub spine: Spine,

    /// The decoded table of contents, empty if the spine names none
    pub navigation: Navigation,

    /// Non-fatal findings collected while resolving this package
    pub diagnostics: Vec<Diagnostic>,

    manifest_index: HashMap<String, usize>,
}

impl Package {
    /// Returns the directory of the package document inside the archive
    ///
    /// Manifest hrefs are relative to this directory.
    pub fn base_dir(&self) -> &str {
        parent_dir(&self.rootfile)
    }

    /// Looks up a manifest item by its id
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest_index
            .get(id)
            .and_then(|index| self.manifest.get(*index))
    }

    /// Iterates the spine in reading order, together with the bound manifest items
    pub fn spine_items(&self) -> impl Iterator<Item = (&SpineItem, &ManifestItem)> {
        self.spine
            .items
            .iter()
            .filter_map(|itemref| Some((itemref, self.manifest_item(&itemref.idref)?)))
    }

    /// Returns the manifest item of the cover image
    ///
    /// A manifest item flagged `cover-image` wins over a `<meta name="cover">`
    /// declaration, whatever the order of the two in the package document.
    ///
    /// ## Return
    /// - `Ok(&ManifestItem)`: The cover item
    /// - `Err(EpubError::BadManifest)`: A cover declaration names a non-existent item
    /// - `Err(EpubError::MissingCoverId)`: The package declares no cover
    pub fn cover_item(&self) -> Result<&ManifestItem, EpubError> {
        if let Some(item) = self
            .manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
        {
            return Ok(item);
        }

        let cover = self.metadata.cover.as_ref().ok_or(EpubError::MissingCoverId)?;
        self.manifest_item(&cover.id)
            .ok_or_else(|| EpubError::BadManifest {
                id: cover.id.clone(),
            })
    }
}

/// Decodes a package document into its raw sections
///
/// The result is not yet bound: the manifest index is empty and no archive
/// entries are resolved, see [bind_references].
///
/// ## Parameters
/// - `rootfile`: The archive path of the package document, used in errors
/// - `content`: The decoded text of the package document
pub fn parse_package(rootfile: &str, content: &str) -> Result<Package, EpubError> {
    let root = XmlReader::parse(content).map_err(|err| EpubError::decoding(rootfile, err))?;

    let unique_identifier = root.get_attr("unique-identifier").unwrap_or_default();

    let metadata = match root.find_children_by_name("metadata").next() {
        Some(element) => parse_metadata(element),
        None => {
            warn!("The package document \"{}\" has no metadata block.", rootfile);
            Metadata::default()
        }
    };

    let manifest = match root.find_children_by_name("manifest").next() {
        Some(element) => parse_manifest(element)?,
        None => vec![],
    };

    let spine = match root.find_children_by_name("spine").next() {
        Some(element) => parse_spine(element)?,
        None => Spine::default(),
    };

    Ok(Package {
        rootfile: rootfile.to_string(),
        unique_identifier,
        metadata,
        manifest,
        spine,
        navigation: Navigation::default(),
        diagnostics: vec![],
        manifest_index: HashMap::new(),
    })
}

/// Parse the EPUB manifest section
///
/// Each `<item>` must carry an `id` and an `href`; a missing `media-type`
/// is kept as an empty string.
fn parse_manifest(manifest_element: &XmlElement) -> Result<Vec<ManifestItem>, EpubError> {
    let mut resources = Vec::with_capacity(manifest_element.children.len());

    for element in manifest_element.find_children_by_name("item") {
        let id = element.get_non_empty_attr("id").ok_or_else(|| {
            EpubError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: "id".to_string(),
            }
        })?;
        let href = element.get_non_empty_attr("href").ok_or_else(|| {
            EpubError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: "href".to_string(),
            }
        })?;
        let media_type = element.get_attr("media-type").unwrap_or_default();
        let properties = element.get_attr("properties").unwrap_or_default();

        resources.push(ManifestItem {
            id,
            href,
            media_type,
            properties,
            entry: None,
        });
    }

    Ok(resources)
}

/// Parse the EPUB spine section
///
/// Itemrefs are kept in reading order. An itemref is linear unless its
/// `linear` attribute is exactly "no".
fn parse_spine(spine_element: &XmlElement) -> Result<Spine, EpubError> {
    let mut items = Vec::new();
    for element in spine_element.find_children_by_name("itemref") {
        let idref = element.get_non_empty_attr("idref").ok_or_else(|| {
            EpubError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: "idref".to_string(),
            }
        })?;
        let id = element.get_non_empty_attr("id");
        let linear = element
            .get_attr("linear")
            .map(|linear| linear != "no")
            .unwrap_or(true);
        let properties = element.get_non_empty_attr("properties");

        items.push(SpineItem {
            idref,
            id,
            properties,
            linear,
        });
    }

    Ok(Spine {
        toc: spine_element.get_non_empty_attr("toc"),
        page_progression_direction: spine_element.get_non_empty_attr("page-progression-direction"),
        items,
    })
}

/// Cross-references the sections of a parsed package
///
/// - Builds the id index of the manifest, rejecting duplicate ids.
/// - Resolves every manifest href against the package directory and looks up
///   the archive entry. A missing entry is tolerated here and recorded as a
///   diagnostic; it only fails once the content of the item is requested.
/// - Records the first manifest item flagged `cover-image` as the cover.
/// - Binds every spine itemref, failing with `BadItemref` on an unknown id.
pub fn bind_references<R: Read + Seek>(
    package: &mut Package,
    archive: &ZipArchive<R>,
) -> Result<(), EpubError> {
    let base_dir = parent_dir(&package.rootfile).to_string();

    let mut manifest_index = HashMap::with_capacity(package.manifest.len());
    for (index, item) in package.manifest.iter().enumerate() {
        if manifest_index.insert(item.id.clone(), index).is_some() {
            return Err(EpubError::DuplicateManifestId {
                id: item.id.clone(),
            });
        }
    }

    for item in package.manifest.iter_mut() {
        let path = resolve_href(&base_dir, &item.href);
        item.entry = path
            .as_deref()
            .and_then(|path| find_archive_entry(archive, path));

        if item.entry.is_none() {
            let path = path.unwrap_or_else(|| item.href.clone());
            warn!(
                "The manifest item \"{}\" references \"{}\", which is not in the archive.",
                item.id, path
            );
            package.diagnostics.push(Diagnostic::UnresolvedManifestHref {
                id: item.id.clone(),
                path,
            });
        }
    }

    if let Some(item) = package
        .manifest
        .iter()
        .find(|item| item.has_property("cover-image"))
    {
        package.metadata.cover = Some(CoverRef {
            id: item.id.clone(),
            source: CoverSource::ManifestProperty,
        });
    }

    for itemref in package.spine.items.iter() {
        if !manifest_index.contains_key(&itemref.idref) {
            return Err(EpubError::BadItemref {
                idref: itemref.idref.clone(),
            });
        }
    }

    package.manifest_index = manifest_index;
    Ok(())
}
