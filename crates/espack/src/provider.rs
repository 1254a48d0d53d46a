//! # Graph-Builder Interface
//!
//! The contract the archive writer consumes from an external module
//! provider (the component that fetches, transpiles, and classifies
//! sources). The writer issues one [`LoadRequest`] per specifier and the
//! provider answers with a [`LoadResponse`], or `None` for a module that
//! does not exist.
//!
//! [`Archive::from_roots`] is the writer side: it embeds loaded modules,
//! records a redirect whenever the provider resolved a request to a
//! different specifier, and leaves external and built-in specifiers out
//! of the archive. Fetching, transpilation, and import-map resolution
//! all live behind the provider.

use espack_core::{ParseError, ParseResult};
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::module::ModuleKind;

/// Boxed error type providers report failures with.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a provider should treat its cache for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSetting {
    /// Use cached data when present.
    Use,
    /// Bypass the cache and refetch.
    Reload,
    /// Serve only from the cache; fail on a miss.
    Only,
}

/// One load request issued by the archive writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    /// The specifier to load.
    pub specifier: String,
    /// Whether the import was dynamic.
    pub is_dynamic: bool,
    /// Cache policy for this request.
    pub cache_setting: CacheSetting,
    /// Expected content checksum, when the caller has one to enforce.
    pub expected_checksum: Option<String>,
}

impl LoadRequest {
    /// A plain static load of `specifier` with default cache policy.
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            is_dynamic: false,
            cache_setting: CacheSetting::Use,
            expected_checksum: None,
        }
    }
}

/// A provider's answer to a load request.
#[derive(Debug, Clone)]
pub enum LoadResponse {
    /// A fetched module: the final specifier (after any redirects the
    /// provider followed), the reported content type, and the bytes.
    Module {
        specifier: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
    /// A specifier resolved to an external resource, recorded but not
    /// embedded.
    External { specifier: String },
    /// A built-in Node module, never embedded.
    BuiltInNode { specifier: String },
}

/// The seam between the archive writer and the external graph builder.
pub trait ModuleProvider {
    /// Load one specifier. `Ok(None)` means the module does not exist.
    fn load(
        &self,
        request: LoadRequest,
    ) -> impl std::future::Future<Output = Result<Option<LoadResponse>, ProviderError>> + Send;
}

impl Archive {
    /// Build an archive by loading each root through `provider`.
    ///
    /// Provider failures and missing roots propagate tagged with the
    /// specifier that was being loaded.
    pub async fn from_roots<P: ModuleProvider>(
        roots: Vec<String>,
        provider: &P,
    ) -> ParseResult<Self> {
        let mut archive = Archive::new();
        for root in roots {
            let response = provider
                .load(LoadRequest::new(root.clone()))
                .await
                .map_err(|err| ParseError::Provider {
                    specifier: root.clone(),
                    reason: err.to_string(),
                })?;
            match response {
                None => {
                    return Err(ParseError::Provider {
                        specifier: root,
                        reason: "module not found".to_string(),
                    });
                }
                Some(LoadResponse::Module {
                    specifier,
                    content_type,
                    bytes,
                }) => {
                    let kind = ModuleKind::from_content_type(content_type.as_deref());
                    if specifier != root {
                        archive.add_redirect(root, specifier.clone());
                    }
                    archive.add_module(specifier, kind, bytes, Vec::new());
                }
                Some(LoadResponse::External { .. }) | Some(LoadResponse::BuiltInNode { .. }) => {}
            }
        }
        Ok(archive)
    }
}
