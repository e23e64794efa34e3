//! `corpus_core` is the engine behind the `corpus` command line tool. It turns a
//! directory of TypeScript, JavaScript, Markdown and MDX files into an addressable, orderable,
//! metadata-rich index and keeps that index in sync with the filesystem.
//!
//! ## Pipeline
//!
//! ```text
//! Directory tree
//!   → Project (tracked source text, refresh barrier)
//!   → Source tree (pathnames + order keys)
//!   → Static analysis (exports, JSDoc, section trees, export closures)
//!   → Collection discovery (literal `createCollection(pattern, options)` calls)
//!   → Import map (lazy `import()` per pattern and extension)
//! ```
//!
//! ## Modules
//!
//! - [`paths`]: Pure path and pathname helpers (`basename`, `extname`, `join`, kebab-casing,
//!   slugs, glob parents, editor URIs).
//! - [`tree`]: Source trees with pathname and order-key maps.
//! - [`project`]: The explicit project context every operation receives.
//! - [`analysis`]: Parsing modules with tree-sitter and analyzing files or snippets.
//! - [`docs`]: JSDoc and plain comment extraction.
//! - [`closure`]: Isolating one export with its local dependencies.
//! - [`sections`]: Heading and section trees for long-form documents.
//! - [`discovery`]: Finding collection declarations.
//! - [`import_map`]: Resolving collection patterns and generating the import-map module.
//! - [`collection`]: Loading collection entries with metadata.
//! - [`watcher`]: Keeping a project in sync with filesystem events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corpus_core::Project;
//! use corpus_core::write_collection_import_maps;
//!
//! let project = Project::open_with_config(".").unwrap();
//! let written = write_collection_import_maps(&project).unwrap();
//! println!("{} collection(s) -> {}", written.collections, written.path.display());
//! ```

pub use analysis::*;
pub use barrier::*;
pub use closure::*;
pub use collection::*;
pub use config::*;
pub use discovery::*;
pub use docs::*;
pub use error::*;
pub use import_map::*;
pub use literal::*;
pub use project::*;
pub use sections::*;
pub use tree::*;
pub use watcher::*;

pub mod analysis;
mod barrier;
pub mod closure;
pub mod collection;
pub mod config;
pub mod discovery;
pub mod docs;
#[allow(unused_assignments)]
mod error;
pub mod import_map;
pub mod literal;
pub mod paths;
pub mod project;
pub mod sections;
pub mod tree;
pub mod watcher;

#[cfg(test)]
mod __tests;
