//! Generation settings and their validation.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use owo_colors::OwoColorize;

use crate::generator::fs::{RealFs, SiteFs};
use crate::route::Route;
use crate::sitemap::SiteMap;

/// Boxed future returned by generation hooks.
pub type HookFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Everything a page render gets to see.
pub struct RenderPageContext {
    /// Normalized URL of the page being rendered.
    pub url: String,
    pub route: Arc<Route>,
    pub site_map: Arc<SiteMap>,
    /// Contents of the entry template file.
    pub entry_html: Arc<str>,
}

/// Handed to a custom redirect-file hook in place of the built-in
/// meta-refresh output.
pub struct RedirectFilesContext {
    pub site_map: Arc<SiteMap>,
    pub root: PathBuf,
    pub fs: Arc<dyn SiteFs>,
}

pub type RenderPageFn =
    Arc<dyn Fn(RenderPageContext) -> HookFuture<anyhow::Result<String>> + Send + Sync>;
pub type RedirectFilesFn =
    Arc<dyn Fn(RedirectFilesContext) -> HookFuture<anyhow::Result<()>> + Send + Sync>;
pub type PagePathnameFn = Arc<dyn Fn(&str) -> PathBuf + Send + Sync>;

// ============================================================================
// Config
// ============================================================================

/// Builder-style settings for [`generate`](crate::generator::generate).
///
/// Only `render_page_to_string` is required; everything else has defaults
/// that mirror a conventional `build/` output directory.
#[derive(Clone)]
pub struct GeneratorConfig {
    root: PathBuf,
    entry: PathBuf,
    page_pathname: PagePathnameFn,
    render_page_to_string: Option<RenderPageFn>,
    create_redirect_files: Option<RedirectFilesFn>,
    fs: Arc<dyn SiteFs>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            entry: PathBuf::from("index.html"),
            page_pathname: Arc::new(default_page_pathname),
            render_page_to_string: None,
            create_redirect_files: None,
            fs: Arc::new(RealFs),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output directory. Defaults to `build`.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Entry template, relative to `root`. Defaults to `index.html` and
    /// must already exist when generation starts.
    pub fn entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Maps a normalized URL to the file path (relative to `root`) its
    /// page is written to. The default maps `/` to `index.html` and
    /// `/blog/post/` to `blog/post/index.html`.
    pub fn page_pathname<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> PathBuf + Send + Sync + 'static,
    {
        self.page_pathname = Arc::new(f);
        self
    }

    /// Required hook that renders one resolved route to an HTML string.
    pub fn render_page_to_string<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RenderPageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.render_page_to_string = Some(Arc::new(move |cx| Box::pin(f(cx))));
        self
    }

    /// Replaces the built-in meta-refresh redirect files with a custom
    /// writer, e.g. for host-specific redirect manifests.
    pub fn create_redirect_files<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RedirectFilesContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.create_redirect_files = Some(Arc::new(move |cx| Box::pin(f(cx))));
        self
    }

    /// Filesystem the output is written through. Defaults to the real disk.
    pub fn fs(mut self, fs: Arc<dyn SiteFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Checks that the settings can actually drive a generation run.
    pub fn validate(&self) -> Result<(), ConfigDiagnostics> {
        let mut diagnostics = ConfigDiagnostics::new();

        if self.render_page_to_string.is_none() {
            diagnostics.error_with_hint(
                FieldPath::new("render_page_to_string"),
                "required hook is missing",
                "provide a function that renders one route to an HTML string",
            );
        }

        let entry = self.entry_path();
        if !self.fs.exists(&entry) {
            diagnostics.error_with_hint(
                FieldPath::new("entry"),
                format!("could not find the entry file `{}`", entry.display()),
                "the entry template must exist under `root` before generating",
            );
        }

        diagnostics.into_result()
    }

    pub(crate) fn output_root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn entry_path(&self) -> PathBuf {
        self.root.join(&self.entry)
    }

    pub(crate) fn page_path(&self, url: &str) -> PathBuf {
        (self.page_pathname)(url)
    }

    pub(crate) fn renderer(&self) -> Option<&RenderPageFn> {
        self.render_page_to_string.as_ref()
    }

    pub(crate) fn redirect_writer(&self) -> Option<&RedirectFilesFn> {
        self.create_redirect_files.as_ref()
    }

    pub(crate) fn site_fs(&self) -> &Arc<dyn SiteFs> {
        &self.fs
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("root", &self.root)
            .field("entry", &self.entry)
            .field("render_page_to_string", &self.render_page_to_string.is_some())
            .field("create_redirect_files", &self.create_redirect_files.is_some())
            .finish()
    }
}

fn default_page_pathname(url: &str) -> PathBuf {
    let trimmed = url.trim_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("index.html")
    } else {
        PathBuf::from(trimmed).join("index.html")
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Dotted path to the config field a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(pub &'static str);

impl FieldPath {
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

/// A single validation problem, with an optional fix-it hint.
#[derive(Debug, Clone)]
pub struct ConfigDiagnostic {
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl ConfigDiagnostic {
    pub fn new(field: FieldPath, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{} {} {}",
            "[".dimmed(),
            self.field.as_str().cyan(),
            "]".dimmed(),
            "→".red(),
            self.message
        )?;
        if let Some(hint) = &self.hint {
            write!(f, "\n    {} {}", "hint:".yellow(), hint)?;
        }
        Ok(())
    }
}

/// Collected validation problems for one config.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<ConfigDiagnostic>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.errors.push(ConfigDiagnostic::new(field, message));
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.errors
            .push(ConfigDiagnostic::new(field, message).with_hint(hint));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ConfigDiagnostic] {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.has_errors() { Err(self) } else { Ok(()) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "config validation failed:".red().bold())?;
        for error in &self.errors {
            writeln!(f, "  {error}")?;
        }
        write!(
            f,
            "found {} {}",
            self.errors.len(),
            if self.errors.len() == 1 { "error" } else { "errors" }
        )
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::fs::MemoryFs;

    #[test]
    fn test_default_page_pathname() {
        assert_eq!(default_page_pathname("/"), PathBuf::from("index.html"));
        assert_eq!(
            default_page_pathname("/about/"),
            PathBuf::from("about/index.html")
        );
        assert_eq!(
            default_page_pathname("/blog/post/"),
            PathBuf::from("blog/post/index.html")
        );
    }

    #[test]
    fn test_validate_requires_render_hook() {
        let fs = Arc::new(MemoryFs::new());
        fs.seed("build/index.html", "<html></html>");

        let config = GeneratorConfig::new().fs(fs);
        let diagnostics = config.validate().unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics.errors()[0].field.as_str(),
            "render_page_to_string"
        );
    }

    #[test]
    fn test_validate_requires_entry_file() {
        let config = GeneratorConfig::new()
            .fs(Arc::new(MemoryFs::new()))
            .render_page_to_string(|_cx| async { Ok(String::new()) });
        let diagnostics = config.validate().unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.errors()[0].field.as_str(), "entry");
        assert!(diagnostics.errors()[0].message.contains("build/index.html"));
    }

    #[test]
    fn test_validate_passes_when_complete() {
        let fs = Arc::new(MemoryFs::new());
        fs.seed("out/app.html", "<html></html>");

        let config = GeneratorConfig::new()
            .root("out")
            .entry("app.html")
            .fs(fs)
            .render_page_to_string(|_cx| async { Ok(String::new()) });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_diagnostics_display_mentions_field_and_hint() {
        let mut diagnostics = ConfigDiagnostics::new();
        diagnostics.error_with_hint(
            FieldPath::new("entry"),
            "could not find the entry file",
            "create it first",
        );
        let rendered = diagnostics.to_string();
        assert!(rendered.contains("entry"));
        assert!(rendered.contains("create it first"));
        assert!(rendered.contains("found 1 error"));
    }
}
