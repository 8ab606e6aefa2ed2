//! Session configuration and resource resolution.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Resolves named resources (modules, data files) on behalf of an interpreter context.
///
/// This is the host-side lookup the engine consults when guest code imports
/// something that lives outside the guest's own search path. A session holds
/// at most one resolver at a time; see
/// [`Session::set_resource_resolver`](crate::Session::set_resource_resolver).
pub trait ResourceResolver: fmt::Debug + Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Returns the location of `resource`, or `None` when this resolver does not know it.
    fn resolve(&self, resource: &str) -> Option<PathBuf>;
}

/// Resolver that looks a resource up relative to a fixed list of root directories.
///
/// Roots are searched in order and the first existing candidate wins.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    name: String,
    roots: Vec<PathBuf>,
}

impl SearchPathResolver {
    #[must_use]
    pub fn new(name: impl Into<String>, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            name: name.into(),
            roots: roots.into_iter().collect(),
        }
    }

    /// The directories searched, in order.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ResourceResolver for SearchPathResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, resource: &str) -> Option<PathBuf> {
        let relative = Path::new(resource);
        if relative.is_absolute() {
            return None;
        }
        self.roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.exists())
    }
}

/// Configuration snapshot taken when a session is created.
///
/// Build with the builder methods, or deserialize from any serde format; fields
/// missing from the input take their defaults. The resource resolver is a live
/// object and is never serialized.
///
/// ```
/// use tether::SessionConfig;
///
/// let config = SessionConfig::new()
///     .interactive(true)
///     .include_path("/opt/app/lib")
///     .shared_module("numpy");
/// assert!(config.interactive);
/// assert!(config.has_shared_modules());
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Buffer incomplete statements in `evaluate` until they form a complete unit.
    pub interactive: bool,
    /// Directories appended to the guest's module search path at init.
    pub include_paths: Vec<PathBuf>,
    /// Modules shared with the main engine instance instead of being re-imported per context.
    pub shared_modules: Vec<String>,
    /// Route guest stdout/stderr to the host's streams.
    pub redirect_output_streams: bool,
    /// Give the session its own isolated context rather than sharing the main one.
    pub isolated: bool,
    /// Create the session without acquiring a context; call `Session::init` later.
    pub postpone_init: bool,
    /// Resolver handed to the engine; `None` uses the engine's default.
    #[serde(skip)]
    pub resource_resolver: Option<Arc<dyn ResourceResolver>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            include_paths: Vec::new(),
            shared_modules: Vec::new(),
            redirect_output_streams: false,
            isolated: true,
            postpone_init: false,
            resource_resolver: None,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with every option at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets interactive (statement-buffering) mode.
    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Appends a directory to the guest module search path.
    #[must_use]
    pub fn include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Marks a module as shared with the main engine instance.
    #[must_use]
    pub fn shared_module(mut self, name: impl Into<String>) -> Self {
        self.shared_modules.push(name.into());
        self
    }

    /// Sets the resolver handed to the engine at context acquisition.
    #[must_use]
    pub fn resource_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resource_resolver = Some(resolver);
        self
    }

    /// Routes guest output streams to the host.
    #[must_use]
    pub fn redirect_output_streams(mut self, redirect: bool) -> Self {
        self.redirect_output_streams = redirect;
        self
    }

    /// Chooses between an isolated context and the shared main context.
    #[must_use]
    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    /// Defers context acquisition until `Session::init` is called.
    #[must_use]
    pub fn postpone_init(mut self, postpone: bool) -> Self {
        self.postpone_init = postpone;
        self
    }

    /// Whether any shared modules were requested.
    #[must_use]
    pub fn has_shared_modules(&self) -> bool {
        !self.shared_modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_path_resolver_returns_first_existing_candidate() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("helpers.py"), "x = 1\n").unwrap();

        let resolver = SearchPathResolver::new(
            "test",
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        assert_eq!(
            resolver.resolve("helpers.py"),
            Some(second.path().join("helpers.py"))
        );
        assert_eq!(resolver.resolve("missing.py"), None);
    }

    #[test]
    fn search_path_resolver_rejects_absolute_resources() {
        let root = tempfile::tempdir().unwrap();
        let resolver = SearchPathResolver::new("test", vec![root.path().to_path_buf()]);
        assert_eq!(resolver.resolve("/etc/passwd"), None);
    }

    #[test]
    fn default_config_is_isolated_and_non_interactive() {
        let config = SessionConfig::default();
        assert!(config.isolated);
        assert!(!config.interactive);
        assert!(!config.postpone_init);
        assert!(!config.has_shared_modules());
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"interactive": true, "include_paths": ["/srv/lib"]}"#).unwrap();
        assert!(config.interactive);
        assert_eq!(config.include_paths, vec![PathBuf::from("/srv/lib")]);
        assert!(config.isolated);
        assert!(config.resource_resolver.is_none());
    }
}
