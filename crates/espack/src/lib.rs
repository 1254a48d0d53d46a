//! # espack: Streaming Module-Graph Archives
//!
//! Losslessly serializes an ECMAScript/TypeScript module graph (fetched
//! sources, their redirects, and optionally a resolved npm package
//! snapshot) into a single compact binary archive, and parses such
//! archives back.
//!
//! ```text
//! magic[8] | options frame | modules frame | packages frame
//!          | sources region | source-maps region
//! ```
//!
//! Parsing is two-phase: the module index is available as soon as the
//! header frames are consumed, while module bodies stream in behind a
//! completion future. Consumers can await one module's body without
//! blocking on the rest of the archive.
//!
//! ```no_run
//! # async fn demo(stream: tokio::fs::File) -> espack::ParseResult<()> {
//! let (archive, load) = espack::Archive::parse(stream).await?;
//! let load = tokio::spawn(load);
//!
//! if let Some(module) = archive.lookup("file:///main.ts") {
//!     let source = module.source().await?;
//! }
//!
//! load.await.expect("load task panicked")?;
//! # Ok(())
//! # }
//! ```
//!
//! The obsolete JSON-based v1 format is readable through
//! [`LegacyArchive`]; only the binary format is written.

pub mod archive;
mod frame;
mod header;
pub mod legacy;
mod loader;
pub mod module;
pub mod npm;
pub mod provider;
pub mod version;

pub use archive::Archive;
pub use espack_core::{Checksum, ParseError, ParseResult};
pub use legacy::{LegacyArchive, LegacyModule};
pub use module::{Module, ModuleKind};
pub use npm::{NpmPackage, NpmPackageId, NpmSnapshot};
pub use provider::{CacheSetting, LoadRequest, LoadResponse, ModuleProvider, ProviderError};
pub use version::{Options, Version};
