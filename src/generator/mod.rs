//! Static-site generation on top of the crawler.
//!
//! [`generate`] crawls every reachable URL through a [`Router`], renders
//! each page with the configured hook, and writes the result into the
//! output directory. Redirects become small meta-refresh HTML files so a
//! statically hosted site still forwards old URLs, unless a custom
//! redirect writer replaces them.

mod config;
mod fs;

pub use config::{
    ConfigDiagnostic, ConfigDiagnostics, FieldPath, GeneratorConfig, HookFuture, PagePathnameFn,
    RedirectFilesContext, RedirectFilesFn, RenderPageContext, RenderPageFn,
};
pub use fs::{MemoryFs, RealFs, SiteFs};

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::log;
use crate::router::Router;
use crate::sitemap::{SiteMap, crawl};

/// What a generation run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerateSummary {
    /// Pages rendered and written.
    pub pages: usize,
    /// Redirect files written.
    pub redirects: usize,
    /// URLs that failed to resolve and were skipped.
    pub errors: usize,
}

/// Crawls the router and writes the whole site to `config.root`.
///
/// URLs whose resolution failed are logged and skipped rather than
/// aborting the run; render and write failures do abort, since a half
/// written page is worse than none.
pub async fn generate(router: &Router, config: &GeneratorConfig) -> anyhow::Result<GenerateSummary> {
    config.validate().map_err(anyhow::Error::new)?;
    let render = config
        .renderer()
        .context("render_page_to_string hook is required")?;

    let entry_path = config.entry_path();
    let entry_html: Arc<str> = config
        .site_fs()
        .read_to_string(&entry_path)
        .with_context(|| format!("failed to read entry file `{}`", entry_path.display()))?
        .into();

    let site_map = Arc::new(crawl(router).await);
    for (url, error) in &site_map.errors {
        log!("error"; "{url} failed to resolve: {error}");
    }

    let mut pages = 0;
    for (url, route) in &site_map.pages {
        let html = render(RenderPageContext {
            url: url.clone(),
            route: Arc::clone(route),
            site_map: Arc::clone(&site_map),
            entry_html: Arc::clone(&entry_html),
        })
        .await
        .with_context(|| format!("failed to render `{url}`"))?;

        let relative = config.page_path(url);
        write_output(config, &relative, &html)
            .with_context(|| format!("failed to write page for `{url}`"))?;
        log!("write"; "{}", relative.display());
        pages += 1;
    }

    match config.redirect_writer() {
        Some(hook) => {
            hook(RedirectFilesContext {
                site_map: Arc::clone(&site_map),
                root: config.output_root().to_path_buf(),
                fs: Arc::clone(config.site_fs()),
            })
            .await
            .context("create_redirect_files hook failed")?;
        }
        None => write_meta_refresh_redirects(config, &site_map)?,
    }

    Ok(GenerateSummary {
        pages,
        redirects: site_map.redirects.len(),
        errors: site_map.errors.len(),
    })
}

/// Default redirect output: one HTML file per redirect whose meta-refresh
/// tag forwards the browser immediately.
fn write_meta_refresh_redirects(
    config: &GeneratorConfig,
    site_map: &SiteMap,
) -> anyhow::Result<()> {
    for (url, to) in &site_map.redirects {
        let relative = config.page_path(url);
        let target = to.href();
        let html = format!("<meta http-equiv=\"refresh\" content=\"0; URL='{target}'\" />");
        write_output(config, &relative, &html)
            .with_context(|| format!("failed to write redirect for `{url}`"))?;
        log!("redirect"; "{} -> {}", relative.display(), target);
    }
    Ok(())
}

fn write_output(config: &GeneratorConfig, relative: &Path, contents: &str) -> anyhow::Result<()> {
    let path = config.output_root().join(relative);
    if let Some(parent) = path.parent() {
        config.site_fs().ensure_dir(parent)?;
    }
    config.site_fs().write(&path, contents)?;
    Ok(())
}
