//! Template discovery, compilation and lookup.
//!
//! Each application contributes one or more root directories. Under every
//! root, files below `layouts/` are layouts; every other file is a content
//! template. The compiled result is indexed as
//! application → layout → format → name, where the empty layout name holds
//! the standalone (unwrapped) templates.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{value::ValueKind, Environment, Value};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::helpers::Helpers;
use super::naming::{template_key, to_snake_case};
use crate::error::BuildError;

/// Directory (under each root) holding layout files.
pub const LAYOUT_DIR: &str = "layouts";

/// Environment name a layout is registered under.
///
/// Content names come from relative paths and never start with `/`, so the
/// two namespaces cannot collide.
pub(crate) fn layout_key(name: &str, format: &str) -> String {
    format!("/{LAYOUT_DIR}/{name}.{format}")
}

pub(crate) fn is_layout_key(key: &str) -> bool {
    key.starts_with('/')
}

/// Variable through which a layout embeds its content.
pub const LAYOUT_SLOT: &str = "yield";

/// Template search paths for one application.
///
/// ```toml
/// [[templates]]
/// name = "blog"
/// paths = ["app/views", "vendor/theme/views"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSearchSpec {
    /// Application name (unique key)
    pub name: String,

    /// Root directories, searched in order
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl TemplateSearchSpec {
    /// Spec for `name` with no paths yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: Vec::new(),
        }
    }

    /// Append a root directory
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }
}

/// Where a compiled entry's sources live inside its application environment.
#[derive(Debug, Clone)]
enum TemplateEntry {
    Standalone {
        content: String,
        path: PathBuf,
    },
    Layout {
        layout: String,
        layout_path: PathBuf,
        content: String,
        path: PathBuf,
    },
}

type FormatSet = BTreeMap<String, TemplateEntry>;
type LayoutSet = BTreeMap<String, FormatSet>;

/// Compiled templates of one application.
pub struct AppTemplateSet {
    name: String,
    env: Environment<'static>,
    sources: BTreeMap<String, String>,
    layouts: BTreeMap<String, LayoutSet>,
}

impl fmt::Debug for AppTemplateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppTemplateSet")
            .field("name", &self.name)
            .field("layouts", &self.layouts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AppTemplateSet {
    /// Application name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a template; `name` is normalised first.
    pub fn get(&self, layout: &str, name: &str, format: &str) -> Option<Template<'_>> {
        let entry = self
            .layouts
            .get(layout)?
            .get(format)?
            .get(&to_snake_case(name))?;
        Some(Template { set: self, entry })
    }

    fn source(&self, key: &str) -> &str {
        self.sources.get(key).map_or("", String::as_str)
    }

    /// Every compiled key as `(layout, format, name)`, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.layouts.iter().flat_map(|(layout, formats)| {
            formats.iter().flat_map(move |(format, names)| {
                names
                    .keys()
                    .map(move |name| (layout.as_str(), format.as_str(), name.as_str()))
            })
        })
    }
}

/// A compiled template, ready to render.
///
/// Layout-wrapped templates render in two stages: the content first, then
/// the layout with the rendered content available as `{{ yield }}`.
#[derive(Clone, Copy)]
pub struct Template<'a> {
    set: &'a AppTemplateSet,
    entry: &'a TemplateEntry,
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(self.entry).finish()
    }
}

impl<'a> Template<'a> {
    /// Render with the given context.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, minijinja::Error> {
        let env = &self.set.env;
        let ctx = Value::from_serialize(&ctx);
        match self.entry {
            TemplateEntry::Standalone { content, .. } => env.get_template(content)?.render(&ctx),
            TemplateEntry::Layout {
                layout, content, ..
            } => {
                let body = env.get_template(content)?.render(&ctx)?;
                env.get_template(layout)?.render(with_slot(&ctx, body))
            }
        }
    }

    /// Source text of the content template
    pub fn source(&self) -> &'a str {
        let content = match self.entry {
            TemplateEntry::Standalone { content, .. } | TemplateEntry::Layout { content, .. } => {
                content
            }
        };
        self.set.source(content)
    }

    /// Original source text of the wrapping layout, if any
    pub fn layout_source(&self) -> Option<&'a str> {
        match self.entry {
            TemplateEntry::Standalone { .. } => None,
            TemplateEntry::Layout { layout, .. } => Some(self.set.source(layout)),
        }
    }

    /// Registered name of the wrapping layout, e.g. `/layouts/app.html`
    pub fn layout(&self) -> Option<&'a str> {
        match self.entry {
            TemplateEntry::Standalone { .. } => None,
            TemplateEntry::Layout { layout, .. } => Some(layout),
        }
    }

    /// File the content template was read from
    pub fn path(&self) -> &'a Path {
        match self.entry {
            TemplateEntry::Standalone { path, .. } | TemplateEntry::Layout { path, .. } => path,
        }
    }

    /// File the layout was read from, if any
    pub fn layout_path(&self) -> Option<&'a Path> {
        match self.entry {
            TemplateEntry::Standalone { .. } => None,
            TemplateEntry::Layout { layout_path, .. } => Some(layout_path),
        }
    }
}

/// The caller's context with the rendered content added under [`LAYOUT_SLOT`].
fn with_slot(ctx: &Value, body: String) -> Value {
    let mut pairs: Vec<(Value, Value)> = Vec::new();
    if ctx.kind() == ValueKind::Map {
        if let Ok(keys) = ctx.try_iter() {
            for key in keys {
                let value = ctx.get_item(&key).unwrap_or_default();
                pairs.push((key, value));
            }
        }
    }
    pairs.push((Value::from(LAYOUT_SLOT), Value::from_safe_string(body)));
    pairs.into_iter().collect()
}

/// Immutable index over every application's compiled templates.
///
/// Safe to share across request tasks behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct TemplateIndex {
    apps: HashMap<String, Arc<AppTemplateSet>>,
}

impl TemplateIndex {
    /// Start building an index with the given helper registry
    pub fn builder(helpers: Helpers) -> TemplateIndexBuilder {
        TemplateIndexBuilder::new(helpers)
    }

    /// Look up a compiled template, or `None` when any level is missing.
    pub fn get(&self, app: &str, layout: &str, name: &str, format: &str) -> Option<Template<'_>> {
        self.apps.get(app)?.get(layout, name, format)
    }

    /// Diagnostic identifier: `app:layout name.format`.
    pub fn ident(app: &str, layout: &str, name: &str, format: &str) -> String {
        format!("{}:{} {}.{}", app, layout, to_snake_case(name), format)
    }

    /// Compiled set of one application
    pub fn app(&self, name: &str) -> Option<&Arc<AppTemplateSet>> {
        self.apps.get(name)
    }

    /// Names of all indexed applications
    pub fn applications(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }
}

/// Collects search specs and compiles them into a [`TemplateIndex`].
///
/// Specs sharing an application name are merged. Applications carried over
/// with [`reuse`](Self::reuse) are not rebuilt.
#[derive(Debug)]
pub struct TemplateIndexBuilder {
    helpers: Helpers,
    specs: Vec<TemplateSearchSpec>,
    existing: HashMap<String, Arc<AppTemplateSet>>,
}

impl TemplateIndexBuilder {
    /// Builder with no specs
    pub fn new(helpers: Helpers) -> Self {
        Self {
            helpers,
            specs: Vec::new(),
            existing: HashMap::new(),
        }
    }

    /// Add a search spec, merging paths into an existing spec of the same name.
    #[must_use]
    pub fn spec(mut self, spec: TemplateSearchSpec) -> Self {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => existing.paths.extend(spec.paths),
            None => self.specs.push(spec),
        }
        self
    }

    /// Add several specs
    #[must_use]
    pub fn specs(self, specs: impl IntoIterator<Item = TemplateSearchSpec>) -> Self {
        specs.into_iter().fold(self, Self::spec)
    }

    /// Carry over the compiled applications of a previous index
    #[must_use]
    pub fn reuse(mut self, previous: &TemplateIndex) -> Self {
        for (name, set) in &previous.apps {
            self.existing.insert(name.clone(), Arc::clone(set));
        }
        self
    }

    /// Compile every application. Any failure discards the whole index.
    pub fn build(self) -> Result<TemplateIndex, BuildError> {
        let mut apps = self.existing;

        for spec in &self.specs {
            if apps.contains_key(&spec.name) {
                tracing::debug!(app = %spec.name, "templates already compiled, skipping");
                continue;
            }
            let set = build_app(spec, &self.helpers)?;
            tracing::info!(
                app = %spec.name,
                templates = set.keys().count(),
                "compiled templates"
            );
            apps.insert(spec.name.clone(), Arc::new(set));
        }

        Ok(TemplateIndex { apps })
    }
}

/// layout name → format → path
type LayoutPaths = BTreeMap<String, BTreeMap<String, PathBuf>>;
/// format → name → path
type ContentPaths = BTreeMap<String, BTreeMap<String, PathBuf>>;

fn build_app(spec: &TemplateSearchSpec, helpers: &Helpers) -> Result<AppTemplateSet, BuildError> {
    let mut layout_paths = LayoutPaths::new();
    let mut content_paths = ContentPaths::new();

    for root in &spec.paths {
        let layout_dir = root.join(LAYOUT_DIR);
        collect_layout_paths(&mut layout_paths, &layout_dir)?;
        collect_template_paths(&mut content_paths, root, &layout_dir)?;
    }

    let mut env = Environment::new();
    helpers.install(&mut env);
    let mut sources = BTreeMap::new();

    let mut layouts = BTreeMap::new();

    let mut standalone = LayoutSet::new();
    for (format, names) in &content_paths {
        let mut set = FormatSet::new();
        for (name, path) in names {
            let key = format!("{name}.{format}");
            add_source(&mut env, &mut sources, key.clone(), path)?;
            set.insert(
                name.clone(),
                TemplateEntry::Standalone {
                    content: key,
                    path: path.clone(),
                },
            );
        }
        standalone.insert(format.clone(), set);
    }
    layouts.insert(String::new(), standalone);

    for (layout_name, formats) in &layout_paths {
        let mut wrapped = LayoutSet::new();
        for (format, layout_path) in formats {
            let layout_key = layout_key(layout_name, format);
            add_source(&mut env, &mut sources, layout_key.clone(), layout_path)?;

            let mut set = FormatSet::new();
            for (name, path) in content_paths.get(format).into_iter().flatten() {
                set.insert(
                    name.clone(),
                    TemplateEntry::Layout {
                        layout: layout_key.clone(),
                        layout_path: layout_path.clone(),
                        content: format!("{name}.{format}"),
                        path: path.clone(),
                    },
                );
            }
            wrapped.insert(format.clone(), set);
        }
        layouts.insert(layout_name.clone(), wrapped);
    }

    Ok(AppTemplateSet {
        name: spec.name.clone(),
        env,
        sources,
        layouts,
    })
}

fn add_source(
    env: &mut Environment<'static>,
    sources: &mut BTreeMap<String, String>,
    key: String,
    path: &Path,
) -> Result<(), BuildError> {
    let source = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    env.add_template_owned(key.clone(), source.clone())
        .map_err(|e| BuildError::parse(path, e))?;
    sources.insert(key, source);
    Ok(())
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn walk_error(root: &Path, err: walkdir::Error) -> BuildError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    BuildError::io(path, source)
}

fn collect_layout_paths(layouts: &mut LayoutPaths, layout_dir: &Path) -> Result<(), BuildError> {
    if !layout_dir.is_dir() {
        return Ok(());
    }

    let walker = WalkDir::new(layout_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(layout_dir, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(layout_dir)
            .unwrap_or_else(|_| entry.path());
        let (name, format) = template_key(rel);
        let formats = layouts.entry(name).or_default();
        if let Some(first) = formats.get(&format) {
            return Err(BuildError::DuplicateLayout {
                first: first.clone(),
                second: entry.path().to_path_buf(),
            });
        }
        formats.insert(format, entry.path().to_path_buf());
    }

    Ok(())
}

fn collect_template_paths(
    templates: &mut ContentPaths,
    root: &Path,
    exclude_dir: &Path,
) -> Result<(), BuildError> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != exclude_dir && !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path());
        let (name, format) = template_key(rel);
        let names = templates.entry(format).or_default();
        if let Some(first) = names.get(&name) {
            return Err(BuildError::DuplicateTemplate {
                first: first.clone(),
                second: entry.path().to_path_buf(),
            });
        }
        names.insert(name, entry.path().to_path_buf());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "layouts/application.html", "<main>{{ yield }}</main><i>{{ title }}</i>");
        write(root, "layouts/application.json", "{\"data\": {{ yield }}}");
        write(root, "UserProfile.html", "<p>{{ user }}</p>");
        write(root, "admin/Dashboard.html", "<h1>{{ title }}</h1>");
        write(root, "user_profile.json", "\"{{ user }}\"");
        write(root, ".hidden.html", "ignored");
        dir
    }

    fn build(specs: Vec<TemplateSearchSpec>) -> Result<TemplateIndex, BuildError> {
        TemplateIndex::builder(Helpers::default()).specs(specs).build()
    }

    #[test]
    fn test_standalone_lookup_normalises_name() {
        let dir = fixture();
        let index = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();

        let tmpl = index.get("app", "", "UserProfile", "html").unwrap();
        assert_eq!(tmpl.render(context! { user => "ann" }).unwrap(), "<p>ann</p>");
        assert!(tmpl.layout_source().is_none());

        let nested = index.get("app", "", "admin/dashboard", "html").unwrap();
        assert_eq!(nested.render(context! { title => "Hi" }).unwrap(), "<h1>Hi</h1>");
    }

    #[test]
    fn test_layout_wraps_content() {
        let dir = fixture();
        let index = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();

        let tmpl = index.get("app", "application", "user_profile", "html").unwrap();
        let out = tmpl
            .render(context! { user => "<ann>", title => "Users" })
            .unwrap();
        assert_eq!(out, "<main><p>&lt;ann&gt;</p></main><i>Users</i>");
        assert_eq!(
            tmpl.layout_source(),
            Some("<main>{{ yield }}</main><i>{{ title }}</i>")
        );
        assert_eq!(tmpl.source(), "<p>{{ user }}</p>");

        let json = index.get("app", "application", "user_profile", "json").unwrap();
        assert_eq!(json.render(context! { user => "ann" }).unwrap(), "{\"data\": \"ann\"}");
    }

    #[test]
    fn test_missing_entries_are_absent() {
        let dir = fixture();
        let index = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();

        assert!(index.get("other", "", "user_profile", "html").is_none());
        assert!(index.get("app", "missing", "user_profile", "html").is_none());
        assert!(index.get("app", "", "user_profile", "xml").is_none());
        assert!(index.get("app", "", "nobody", "html").is_none());
        assert!(index.get("app", "", ".hidden", "html").is_none());
        // layouts are not content templates
        assert!(index.get("app", "", "layouts/application", "html").is_none());
    }

    #[test]
    fn test_duplicate_template_across_roots() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "UserProfile.html", "a");
        write(b.path(), "user_profile.html", "b");

        let err = build(vec![TemplateSearchSpec::new("app")
            .with_path(a.path())
            .with_path(b.path())])
        .unwrap_err();

        match err {
            BuildError::DuplicateTemplate { first, second } => {
                assert_eq!(first, a.path().join("UserProfile.html"));
                assert_eq!(second, b.path().join("user_profile.html"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_layout_across_roots() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "layouts/main.html", "a");
        write(b.path(), "layouts/main.html", "b");

        let err = build(vec![TemplateSearchSpec::new("app")
            .with_path(a.path())
            .with_path(b.path())])
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateLayout { .. }));
    }

    #[test]
    fn test_layout_name_may_repeat_across_formats() {
        let dir = fixture();
        let index = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();
        assert!(index.get("app", "application", "user_profile", "html").is_some());
        assert!(index.get("app", "application", "user_profile", "json").is_some());
    }

    #[test]
    fn test_parse_error_aborts_build() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ok.html", "fine");
        write(dir.path(), "broken.html", "{% if %}");

        let err = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap_err();
        match err {
            BuildError::Parse { path, .. } => assert_eq!(path, dir.path().join("broken.html")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = build(vec![
            TemplateSearchSpec::new("app").with_path(dir.path().join("nope"))
        ])
        .unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = fixture();
        let spec = TemplateSearchSpec::new("app").with_path(dir.path());
        let first = build(vec![spec.clone()]).unwrap();
        let second = build(vec![spec]).unwrap();

        let app_a = first.app("app").unwrap();
        let app_b = second.app("app").unwrap();
        let keys_a: Vec<_> = app_a.keys().collect();
        let keys_b: Vec<_> = app_b.keys().collect();
        assert_eq!(keys_a, keys_b);

        for (layout, format, name) in keys_a {
            let a = first.get("app", layout, name, format).unwrap();
            let b = second.get("app", layout, name, format).unwrap();
            assert_eq!(a.source(), b.source());
            assert_eq!(a.layout_source(), b.layout_source());
            let ctx = context! { user => "u", title => "t" };
            assert_eq!(a.render(&ctx).unwrap(), b.render(&ctx).unwrap());
        }
    }

    #[test]
    fn test_specs_with_same_name_merge_paths() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "one.html", "1");
        write(b.path(), "two.html", "2");

        let index = build(vec![
            TemplateSearchSpec::new("app").with_path(a.path()),
            TemplateSearchSpec::new("app").with_path(b.path()),
        ])
        .unwrap();
        assert!(index.get("app", "", "one", "html").is_some());
        assert!(index.get("app", "", "two", "html").is_some());
    }

    #[test]
    fn test_reuse_skips_compiled_apps() {
        let dir = fixture();
        let first = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();

        // Even a now-broken tree is not recompiled for an app that already exists.
        write(dir.path(), "broken.html", "{% if %}");
        let second = TemplateIndex::builder(Helpers::default())
            .reuse(&first)
            .spec(TemplateSearchSpec::new("app").with_path(dir.path()))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(
            first.app("app").unwrap(),
            second.app("app").unwrap()
        ));
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            TemplateIndex::ident("app", "application", "UserProfile", "html"),
            "app:application user_profile.html"
        );
        assert_eq!(TemplateIndex::ident("app", "", "index", "html"), "app: index.html");
    }

    #[test]
    fn test_partials_resolve_within_application() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "page.html", "[{{ invoke_template(true, 'Card', 'card', item) }}]");
        write(dir.path(), "card.html", "<b>{{ name }}</b>");

        let index = build(vec![TemplateSearchSpec::new("app").with_path(dir.path())]).unwrap();
        let out = index
            .get("app", "", "page", "html")
            .unwrap()
            .render(context! { item => context! { name => "x" } })
            .unwrap();
        assert_eq!(out, "[<b>x</b>]");
    }

    #[test]
    fn test_partials_cannot_reach_layouts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "layouts/app.html", "LAYOUT[{{ yield }}]");
        write(dir.path(), "by_name.html", "{{ invoke_template(false, 'x', 'layouts/app') }}");
        write(dir.path(), "by_key.html", "{{ invoke_template(false, 'x', '/layouts/app') }}");

        let index = build(vec![TemplateSearchSpec::new("a").with_path(dir.path())]).unwrap();
        assert!(index.get("a", "", "layouts/app", "html").is_none());
        for page in ["by_name", "by_key"] {
            let err = index
                .get("a", "", page, "html")
                .unwrap()
                .render(context! {})
                .unwrap_err();
            assert_eq!(err.kind(), minijinja::ErrorKind::TemplateNotFound, "{page}");
        }
    }

    #[test]
    fn test_content_named_like_layout_keeps_both() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "layouts/app.html", "L[{{ yield }}]");
        write(dir.path(), "Layouts/App.html", "content");

        let index = build(vec![TemplateSearchSpec::new("a").with_path(dir.path())]).unwrap();
        let tmpl = index.get("a", "app", "layouts/app", "html").unwrap();
        assert_eq!(tmpl.layout(), Some("/layouts/app.html"));
        assert_eq!(tmpl.render(context! {}).unwrap(), "L[content]");
    }
}
