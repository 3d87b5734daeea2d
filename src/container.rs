//! Container descriptor resolution
//!
//! Every EPUB archive carries `META-INF/container.xml`, which lists the package
//! documents (rootfiles) of the publication. Most publications have exactly one;
//! multiple renditions list several, in order of preference.

use crate::{
    error::EpubError,
    types::Container,
    utils::{DecodeBytes, XmlReader},
};

/// The well-known location of the container descriptor
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Parse the EPUB container file (META-INF/container.xml)
///
/// Extracts the `full-path` of every `rootfile` element, in document order.
/// The referenced locations are not checked against the archive here; the
/// package stage reports a missing one as `BadRootfile`.
///
/// ## Parameters
/// - `data`: The raw bytes of the container descriptor
///
/// ## Return
/// - `Ok(Container)`: The ordered rootfile locations
/// - `Err(EpubError)`: The descriptor is malformed, lists no rootfile,
///   or a rootfile lacks its `full-path` attribute
pub fn parse_container(data: &[u8]) -> Result<Container, EpubError> {
    let root = data
        .decode()
        .and_then(|content| XmlReader::parse(&content))
        .map_err(|err| EpubError::decoding(CONTAINER_PATH, err))?;

    let mut rootfiles = Vec::new();
    for rootfile in root.find_elements_by_name("rootfile") {
        let path = rootfile.get_non_empty_attr("full-path").ok_or_else(|| {
            EpubError::MissingRequiredAttribute {
                tag: rootfile.tag_name(),
                attribute: "full-path".to_string(),
            }
        })?;

        rootfiles.push(path);
    }

    if rootfiles.is_empty() {
        return Err(EpubError::NoRootfile);
    }

    Ok(Container { rootfiles })
}
