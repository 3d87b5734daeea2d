//! Epub refine library
//!
//! A Rust library for resolving EPUB archives into a cross-referenced,
//! immutable document model.
//!
//! Opening a publication decodes the container descriptor, every package
//! document it lists, their manifests and spines, the table of contents, and
//! the publication metadata. The metadata is refined in a second pass: `<meta>`
//! declarations that target elements by id attach sort names, roles, display
//! order and title types, and `dcterms:` terms supply whole fields.
//!
//! ## Features
//!
//! - Resolve the container, every rendition and its manifest and spine.
//! - Refine metadata with an open vocabulary; unknown declarations never fail
//!   the parse and are reported through per-package diagnostics.
//! - Decode NCX navigation into a nested tree.
//! - Open independent content streams from any number of threads.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use epub_refine::epub::EpubDoc;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open EPUB file
//! let doc = EpubDoc::new("path/to/epub/file.epub")?;
//! let package = doc.package().unwrap();
//!
//! // Get metadata
//! println!("Title: {}", package.metadata.title.text);
//! println!("Sort as: {:?}", package.metadata.title.file_as);
//!
//! // Read content in spine order
//! for (_itemref, item) in package.spine_items() {
//!     let _content = doc.read_content(item)?;
//! }
//!
//! // Locate the cover image
//! let (_entry, _media_type) = doc.resolve_cover()?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod utils;

pub mod container;
pub mod epub;
pub mod error;
pub mod metadata;
pub mod navigation;
pub mod package;
pub mod types;

pub use epub::{ContentReader, EpubDoc};
pub use error::EpubError;
pub use package::Package;
pub use utils::DecodeBytes;
