//! Error Type Definition Module
//!
//! This module defines the various error types that may be encountered while
//! resolving an EPUB archive into a document model. All errors are uniformly
//! wrapped in the `EpubError` enumeration for convenient error handling by the caller.
//!
//! Structural failures (`NoRootfile`, `BadRootfile`, `NoItemref`, `BadItemref`,
//! `BadManifest`, `MissingCoverId`) are fatal: they indicate the input itself is
//! malformed or incomplete. Unrecognized metadata vocabulary is never reported here,
//! see [crate::types::Diagnostic] instead.

use thiserror::Error;

/// Types of errors that can occur during EPUB processing
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of EPUB files,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Bad item reference error
    ///
    /// A spine itemref names a manifest id that does not exist in the same package.
    /// The whole parse is aborted.
    #[error("Bad itemref: The itemref references the non-existent manifest item \"{idref}\".")]
    BadItemref { idref: String },

    /// Bad manifest error
    ///
    /// A manifest item (or a cover declaration pointing at one) could not be
    /// resolved to an entry of the archive when its content was requested.
    #[error("Bad manifest: The manifest item \"{id}\" does not resolve to an archive entry.")]
    BadManifest { id: String },

    /// Bad rootfile error
    ///
    /// The container descriptor references a package document that does not exist
    /// in the archive.
    #[error("Bad rootfile: The container references the non-existent rootfile \"{path}\".")]
    BadRootfile { path: String },

    /// Wrapped decode failure
    ///
    /// Malformed markup or undecodable bytes in one of the documents of the archive.
    /// `path` names the offending archive entry.
    #[error("Decode error: Failed to decode \"{path}\": {source}")]
    DecodeError {
        path: String,
        source: Box<EpubError>,
    },

    /// Duplicate manifest id error
    ///
    /// Two manifest items of the same package share one id.
    #[error("Duplicate manifest id: More than one manifest item uses the id \"{id}\".")]
    DuplicateManifestId { id: String },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Missing cover id error
    ///
    /// Neither a `cover-image` manifest item nor a `cover` meta declaration exists.
    #[error("Missing cover id: The package does not declare a cover image.")]
    MissingCoverId,

    /// Missing required attribute error
    ///
    /// Triggered when an XML element in an EPUB file lacks the required
    /// attributes required by the EPUB specification.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Mutex error
    ///
    /// This error occurs when a mutex is poisoned, which means
    /// that a thread has panicked while holding a lock on the mutex.
    #[error("Mutex error: Mutex was poisoned.")]
    MutexError,

    /// No item reference error
    ///
    /// None of the packages of the container declares a single spine itemref.
    #[error("No itemref: No itemrefs were found in any spine.")]
    NoItemref,

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks some files or directory
    /// structure that is required in EPUB specification.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// No rootfile error
    ///
    /// The container descriptor does not list any rootfile.
    #[error("No rootfile: No rootfile was found in the container.")]
    NoRootfile,

    /// Navigation manifest id error
    ///
    /// The spine `toc` attribute names a manifest id that does not exist.
    #[error("Toc item not found: There is no manifest item with the toc id \"{id}\".")]
    TocItemNotFound { id: String },

    /// Navigation entry error
    ///
    /// The navigation document was found in the manifest, but its resolved path
    /// does not exist in the archive.
    #[error("Toc entry not found: The navigation document \"{path}\" is not in the archive.")]
    TocEntryNotFound { path: String },

    /// UTF-8 decoding error
    ///
    /// This error occurs when attempting to decode byte data into a UTF-8 string
    /// but the data is not formatted correctly.
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    ///
    /// This error occurs when attempting to decode byte data into a UTF-16 string
    /// but the data is not formatted correctly.
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl EpubError {
    /// Wraps a decode failure with the archive path of the offending document
    pub(crate) fn decoding(path: &str, source: EpubError) -> Self {
        EpubError::DecodeError {
            path: path.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for EpubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        EpubError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for EpubError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        EpubError::Utf16DecodeError { source: value }
    }
}

impl<T> From<std::sync::PoisonError<T>> for EpubError {
    fn from(_value: std::sync::PoisonError<T>) -> Self {
        EpubError::MutexError
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::BadItemref { idref: l_idref }, Self::BadItemref { idref: r_idref }) => {
                l_idref == r_idref
            }
            (Self::BadManifest { id: l_id }, Self::BadManifest { id: r_id }) => l_id == r_id,
            (Self::BadRootfile { path: l_path }, Self::BadRootfile { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::DecodeError {
                    path: l_path,
                    source: l_source,
                },
                Self::DecodeError {
                    path: r_path,
                    source: r_source,
                },
            ) => l_path == r_path && l_source == r_source,
            (
                Self::DuplicateManifestId { id: l_id },
                Self::DuplicateManifestId { id: r_id },
            ) => l_id == r_id,
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::NonCanonicalEpub {
                    expected_file: l_expected_file,
                },
                Self::NonCanonicalEpub {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::TocItemNotFound { id: l_id }, Self::TocItemNotFound { id: r_id }) => {
                l_id == r_id
            }
            (Self::TocEntryNotFound { path: l_path }, Self::TocEntryNotFound { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
