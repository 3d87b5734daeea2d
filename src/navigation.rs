//! Table of contents resolution
//!
//! The spine `toc` attribute names the manifest item of an NCX document. Its
//! `navMap` is decoded into a tree of [NavPoint]s that mirrors the nesting of
//! the source document.

use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::{
    error::EpubError,
    package::Package,
    types::{NavPoint, Navigation},
    utils::{
        DecodeBytes, NormalizeWhitespace, XmlElement, XmlReader, get_entry_in_zip_archive,
        resolve_href,
    },
};

/// Resolves and decodes the table of contents of a bound package
///
/// ## Return
/// - `Ok(Navigation)`: The decoded tree, empty if the spine names no toc
/// - `Err(EpubError::TocItemNotFound)`: The toc id is not in the manifest
/// - `Err(EpubError::TocEntryNotFound)`: The toc item names no archive entry
/// - `Err(EpubError::DecodeError)`: The navigation document is malformed
pub fn resolve_navigation<R: Read + Seek>(
    package: &Package,
    archive: &mut ZipArchive<R>,
) -> Result<Navigation, EpubError> {
    let Some(toc_id) = package.spine.toc.as_deref() else {
        return Ok(Navigation::default());
    };

    let item = package
        .manifest_item(toc_id)
        .ok_or_else(|| EpubError::TocItemNotFound {
            id: toc_id.to_string(),
        })?;

    let entry = item.entry.as_ref().ok_or_else(|| EpubError::TocEntryNotFound {
        path: resolve_href(package.base_dir(), &item.href).unwrap_or_else(|| item.href.clone()),
    })?;

    let data = get_entry_in_zip_archive(archive, entry.index)?;
    let mut navigation = parse_navigation(&entry.name, &data)?;
    navigation.path = Some(entry.name.clone());

    Ok(navigation)
}

/// Decodes an NCX document
///
/// A missing `navMap` or `docTitle` is tolerated and yields an empty tree or
/// title. Attributes and elements outside the NCX vocabulary are ignored.
///
/// ## Parameters
/// - `path`: The archive path of the document, used in errors
/// - `data`: The raw bytes of the document
pub fn parse_navigation(path: &str, data: &[u8]) -> Result<Navigation, EpubError> {
    let ncx = data
        .decode()
        .and_then(|content| XmlReader::parse(&content))
        .map_err(|err| EpubError::decoding(path, err))?;

    let title = ncx
        .find_elements_by_name("docTitle")
        .next()
        .map(|element| element.text().normalize_whitespace())
        .unwrap_or_default();

    let points = match ncx.find_elements_by_name("navMap").next() {
        Some(nav_map) => parse_nav_points(nav_map),
        None => vec![],
    };

    Ok(Navigation {
        path: None,
        title,
        points,
    })
}

/// Recursively parse NCX navigation points from navMap or nested navPoint elements
///
/// Points are kept in document order; `playOrder` is informational only.
fn parse_nav_points(parent_element: &XmlElement) -> Vec<NavPoint> {
    parent_element
        .find_children_by_name("navPoint")
        .map(|nav_point| NavPoint {
            id: nav_point.get_non_empty_attr("id"),
            play_order: nav_point
                .get_attr("playOrder")
                .and_then(|order| order.trim().parse::<usize>().ok()),
            label: nav_point
                .find_children_by_name("navLabel")
                .next()
                .map(|element| element.text().normalize_whitespace())
                .unwrap_or_default(),
            content: nav_point
                .find_children_by_name("content")
                .filter_map(|element| element.get_non_empty_attr("src"))
                .collect(),
            children: parse_nav_points(nav_point),
        })
        .collect()
}
