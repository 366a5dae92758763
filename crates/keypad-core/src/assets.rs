//! Install-time asset manifest.
//!
//! Assets are listed relative to the deployment base so the app works when
//! mounted at the site root or under a subdirectory. The base is derived from
//! the worker scope URL.

use url::Url;

/// Files precached on install, relative to the base path.
pub const DEFAULT_ASSETS: &[&str] = &[
    "index.html",
    "styles.css",
    "app.js",
    "manifest.json",
    "apple-touch-icon-180.png",
    "icon-192.png",
    "icon-512.png",
    "favicon-32x32.png",
    "numpad.png",
    "screenshot.png",
    "service-worker.js",
];

/// The shell document served for every navigation.
pub const DEFAULT_SHELL: &str = "index.html";

/// Substituted for images that cannot be fetched.
pub const DEFAULT_FALLBACK_ICON: &str = "apple-touch-icon-180.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    origin: Url,
    base: String,
    paths: Vec<String>,
    shell: String,
    fallback_icon: String,
}

impl AssetManifest {
    /// Build a manifest for the given worker scope, e.g. `https://host/keypad/`.
    pub fn new(scope: &Url, paths: &[String], shell: &str, fallback_icon: &str) -> Self {
        let mut origin = scope.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        Self {
            origin,
            base: base_path(scope),
            paths: paths.to_vec(),
            shell: shell.to_string(),
            fallback_icon: fallback_icon.to_string(),
        }
    }

    /// Manifest with the default asset list.
    pub fn with_defaults(scope: &Url) -> Self {
        let paths: Vec<String> = DEFAULT_ASSETS.iter().map(|p| p.to_string()).collect();
        Self::new(scope, &paths, DEFAULT_SHELL, DEFAULT_FALLBACK_ICON)
    }

    /// The scope's path without its trailing slash. Empty at the site root.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// `"{base}/{path}"`, with any leading slashes on `path` dropped.
    pub fn path_from_base(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Absolute URL for a path relative to the base.
    pub fn url_from_base(&self, path: &str) -> Url {
        let mut url = self.origin.clone();
        url.set_path(&self.path_from_base(path));
        url
    }

    /// Every listed asset as an absolute URL, in manifest order.
    pub fn urls(&self) -> Vec<Url> {
        self.paths.iter().map(|p| self.url_from_base(p)).collect()
    }

    pub fn shell_url(&self) -> Url {
        self.url_from_base(&self.shell)
    }

    pub fn fallback_icon_url(&self) -> Url {
        self.url_from_base(&self.fallback_icon)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn base_path(scope: &Url) -> String {
    scope.path().trim_end_matches('/').to_string()
}
