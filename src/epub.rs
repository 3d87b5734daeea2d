use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::debug;
use zip::ZipArchive;

use crate::{
    container::{CONTAINER_PATH, parse_container},
    error::EpubError,
    metadata::{extract_declarations, refine_metadata},
    navigation::resolve_navigation,
    package::{Package, bind_references, parse_package},
    types::{ArchiveEntry, Container, ManifestItem},
    utils::{DecodeBytes, get_entry_in_zip_archive, get_file_in_zip_archive},
};

/// EPUB document, representing a loaded and fully resolved EPUB publication
///
/// The `EpubDoc` structure is the core of the entire library. Opening a document
/// runs the whole resolution pipeline once:
///
/// 1. `META-INF/container.xml` is decoded into the list of rootfiles.
/// 2. Each package document is decoded into its metadata, manifest and spine.
/// 3. Manifest hrefs are resolved to archive entries and itemrefs are bound.
/// 4. `<meta>` refinements are applied onto the metadata.
/// 5. The table of contents named by the spine is decoded.
///
/// Any structural failure aborts the whole parse; no partial model is produced.
/// Afterwards the model is immutable. The archive stays behind a mutex so that
/// content can be read through a shared reference, from any number of threads.
pub struct EpubDoc<R: Read + Seek> {
    /// The structure of the epub file that actually holds it
    archive: Mutex<ZipArchive<R>>,

    /// The path to the target epub file, if it was opened from one
    pub epub_path: Option<PathBuf>,

    /// The rootfiles declared by the container descriptor
    pub container: Container,

    /// The resolved packages, in rootfile order
    pub packages: Vec<Package>,
}

impl<R: Read + Seek> EpubDoc<R> {
    /// Creates a new EPUB document instance from a reader
    ///
    /// # Parameters
    /// - `reader`: The data source that implements the `Read` and `Seek` traits,
    ///   usually a file or memory buffer
    ///
    /// # Return
    /// - `Ok(EpubDoc<R>)`: The successfully resolved EPUB document
    /// - `Err(EpubError)`: The first failure encountered by the pipeline
    pub fn from_reader(reader: R) -> Result<Self, EpubError> {
        let mut archive = ZipArchive::new(reader).map_err(EpubError::from)?;

        if archive.index_for_name(CONTAINER_PATH).is_none() {
            return Err(EpubError::NonCanonicalEpub {
                expected_file: CONTAINER_PATH.to_string(),
            });
        }

        let container_data = get_file_in_zip_archive(&mut archive, CONTAINER_PATH)?;
        let container = parse_container(&container_data)?;

        let mut packages = Vec::with_capacity(container.rootfiles.len());
        for rootfile in container.rootfiles.iter() {
            packages.push(Self::load_package(&mut archive, rootfile)?);
        }

        if packages.iter().all(|package| package.spine.items.is_empty()) {
            return Err(EpubError::NoItemref);
        }

        Ok(Self {
            archive: Mutex::new(archive),
            epub_path: None,
            container,
            packages,
        })
    }

    /// Runs the package stages of the pipeline for one rootfile
    fn load_package(archive: &mut ZipArchive<R>, rootfile: &str) -> Result<Package, EpubError> {
        let index = archive
            .index_for_name(rootfile)
            .ok_or_else(|| EpubError::BadRootfile {
                path: rootfile.to_string(),
            })?;

        let content = get_entry_in_zip_archive(archive, index)?
            .decode()
            .map_err(|err| EpubError::decoding(rootfile, err))?;

        let mut package = parse_package(rootfile, &content)?;
        bind_references(&mut package, &*archive)?;

        let declarations = extract_declarations(rootfile, &content)?;
        refine_metadata(
            &mut package.metadata,
            &declarations,
            &package.unique_identifier,
            &mut package.diagnostics,
        );

        package.navigation = resolve_navigation(&package, archive)?;

        debug!(
            "Resolved \"{}\": {} manifest items, {} itemrefs, {} diagnostics.",
            rootfile,
            package.manifest.len(),
            package.spine.items.len(),
            package.diagnostics.len()
        );

        Ok(package)
    }

    /// Returns the default rendition, the package of the first rootfile
    pub fn package(&self) -> Option<&Package> {
        self.packages.first()
    }

    /// Opens an independent stream over the content of a manifest item
    ///
    /// The entry is copied out of the archive while the archive lock is held,
    /// so the returned reader never touches the archive again. Any number of
    /// readers over the same or different items can be alive at once.
    ///
    /// # Return
    /// - `Ok(ContentReader)`: A fresh reader positioned at the start of the content
    /// - `Err(EpubError::BadManifest)`: The item names no archive entry
    pub fn open_content(&self, item: &ManifestItem) -> Result<ContentReader, EpubError> {
        Ok(ContentReader::new(self.read_content(item)?))
    }

    /// Reads the whole content of a manifest item
    pub fn read_content(&self, item: &ManifestItem) -> Result<Vec<u8>, EpubError> {
        let entry = item
            .entry
            .as_ref()
            .ok_or_else(|| EpubError::BadManifest {
                id: item.id.clone(),
            })?;

        let mut archive = self.archive.lock()?;
        get_entry_in_zip_archive(&mut *archive, entry.index)
    }

    /// Resolves the cover image of the default rendition
    ///
    /// See [Package::cover_item] for the precedence between the cover sources.
    ///
    /// # Return
    /// - `Ok((ArchiveEntry, String))`: The archive entry of the cover and its media type
    /// - `Err(EpubError::MissingCoverId)`: The package declares no cover
    /// - `Err(EpubError::BadManifest)`: The cover declaration is broken, or
    ///   the cover item names no archive entry
    pub fn resolve_cover(&self) -> Result<(ArchiveEntry, String), EpubError> {
        let package = self.package().ok_or(EpubError::MissingCoverId)?;
        let item = package.cover_item()?;

        let entry = item.entry.clone().ok_or_else(|| EpubError::BadManifest {
            id: item.id.clone(),
        })?;

        Ok((entry, item.media_type.clone()))
    }
}

impl EpubDoc<BufReader<File>> {
    /// Creates a new EPUB document instance
    ///
    /// This function is a convenience constructor for `EpubDoc`,
    /// used to create an EPUB parser instance directly from a file path.
    ///
    /// # Parameters
    /// - `path`: The path to the EPUB file
    ///
    /// # Return
    /// - `Ok(EpubDoc)`: The successfully resolved EPUB document
    /// - `Err(EpubError)`: The file could not be opened or resolved
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let file = File::open(&path).map_err(EpubError::from)?;
        let mut doc = Self::from_reader(BufReader::new(file))?;
        doc.epub_path = Some(path.as_ref().to_path_buf());
        Ok(doc)
    }
}

/// An owned, independent stream over the content of one manifest item
#[derive(Debug)]
pub struct ContentReader {
    inner: Cursor<Vec<u8>>,
}

impl ContentReader {
    fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// Returns the length of the content in bytes
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the reader, returning the content
    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ContentReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
