//! Functions available inside every template body.
//!
//! | name | purpose |
//! |------|---------|
//! | `contains(seq, value)` | membership test over sequences and strings |
//! | `url(route, params...)` | reverse URL through the configured [`ReverseRouter`] |
//! | `nl2br(text)` | escape, then turn newlines into `<br>` |
//! | `raw(text)` | mark text safe without escaping |
//! | `invoke_template(unit, name, fallback, [ctx])` | render a variant partial |
//! | `date(ts, pattern)` | strftime formatting of a timestamp |

use std::sync::Arc;

use chrono::{
    format::{Item, StrftimeItems},
    DateTime, Utc,
};
use minijinja::{
    context,
    value::{Rest, ValueKind},
    Environment, Error, ErrorKind, HtmlEscape, State, Value,
};

use super::index::is_layout_key;
use super::naming::to_snake_case;
use crate::routing::{ReverseRouter, RouteTable, TruthyVariant, VariantSelector};

/// Format partial templates are looked up in.
pub const PARTIAL_FORMAT: &str = "html";

/// The helper registry injected into every compiled template.
///
/// Immutable once built; cloning shares the collaborators.
#[derive(Clone)]
pub struct Helpers {
    router: Arc<dyn ReverseRouter>,
    variants: Arc<dyn VariantSelector>,
}

impl Default for Helpers {
    fn default() -> Self {
        Self {
            router: Arc::new(RouteTable::new()),
            variants: Arc::new(TruthyVariant),
        }
    }
}

impl std::fmt::Debug for Helpers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Helpers").finish_non_exhaustive()
    }
}

impl Helpers {
    /// Registry backed by the given routing collaborators
    pub fn new(
        router: impl ReverseRouter + 'static,
        variants: impl VariantSelector + 'static,
    ) -> Self {
        Self {
            router: Arc::new(router),
            variants: Arc::new(variants),
        }
    }

    /// Replace the reverse router
    #[must_use]
    pub fn with_router(mut self, router: impl ReverseRouter + 'static) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Replace the variant selector
    #[must_use]
    pub fn with_variants(mut self, variants: impl VariantSelector + 'static) -> Self {
        self.variants = Arc::new(variants);
        self
    }

    pub(crate) fn install(&self, env: &mut Environment<'static>) {
        env.add_function("contains", contains);
        env.add_function("nl2br", nl2br);
        env.add_function("raw", raw);
        env.add_function("date", date);

        let router = Arc::clone(&self.router);
        env.add_function("url", move |name: String, params: Rest<Value>| {
            url(router.as_ref(), &name, &params.0)
        });

        let variants = Arc::clone(&self.variants);
        env.add_function(
            "invoke_template",
            move |state: &State, unit: Value, name: String, fallback: String, ctx: Rest<Value>| {
                invoke_template(state, variants.as_ref(), &unit, &name, &fallback, &ctx.0)
            },
        );
    }
}

/// Whether `item` occurs in `seq`.
///
/// Strings test for a substring; `none`/undefined contain nothing. Any
/// other kind is a usage error in the calling template.
pub fn contains(seq: Value, item: Value) -> Result<bool, Error> {
    match seq.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(false),
        ValueKind::Seq => {
            for value in seq.try_iter()? {
                if value == item {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ValueKind::String => {
            let haystack = seq.as_str().unwrap_or_default();
            Ok(item.as_str().is_some_and(|needle| haystack.contains(needle)))
        }
        kind => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid type {kind}: valid types are sequence and string"),
        )),
    }
}

/// The router encodes parameters, so the path is emitted as-is.
fn url(router: &dyn ReverseRouter, name: &str, params: &[Value]) -> Result<Value, Error> {
    let params: Vec<String> = params.iter().map(ToString::to_string).collect();
    router
        .reverse(name, &params)
        .map(Value::from_safe_string)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Escape `text` and replace newlines with `<br>`.
pub fn nl2br(text: String) -> Value {
    Value::from_safe_string(HtmlEscape(&text).to_string().replace('\n', "<br>"))
}

/// Pass `text` through unescaped. The caller vouches for its safety.
pub fn raw(text: String) -> Value {
    Value::from_safe_string(text)
}

fn invoke_template(
    state: &State,
    variants: &dyn VariantSelector,
    unit: &Value,
    name: &str,
    fallback: &str,
    context: &[Value],
) -> Result<Value, Error> {
    let ctx = match context {
        [] => None,
        [ctx] => Some(ctx),
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "number of context must be 0 or 1",
            ))
        }
    };

    let chosen = if variants.select(unit) { name } else { fallback };
    let key = format!("{}.{}", to_snake_case(chosen), PARTIAL_FORMAT);
    if is_layout_key(&key) {
        return Err(Error::new(
            ErrorKind::TemplateNotFound,
            format!("partial `{chosen}` does not exist"),
        ));
    }
    let template = state.env().get_template(&key)?;
    let html = match ctx {
        Some(ctx) => template.render(ctx)?,
        None => template.render(context! {})?,
    };

    Ok(Value::from_safe_string(html))
}

/// Format a Unix timestamp (integer) or RFC 3339 string with a strftime pattern.
pub fn date(value: Value, pattern: String) -> Result<String, Error> {
    let at: DateTime<Utc> = match value.as_str() {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid date: {e}")))?
            .with_timezone(&Utc),
        None => {
            let secs = i64::try_from(value.clone()).map_err(|_| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("invalid type {}: expected timestamp", value.kind()),
                )
            })?;
            DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                Error::new(ErrorKind::InvalidOperation, "timestamp out of range")
            })?
        }
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(&pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date layout `{pattern}`"),
        ));
    }

    Ok(at.format_with_items(items.iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(templates: &[(&'static str, &'static str)], helpers: &Helpers) -> Environment<'static> {
        let mut env = Environment::new();
        helpers.install(&mut env);
        for &(name, source) in templates {
            env.add_template(name, source).unwrap();
        }
        env
    }

    fn render(env: &Environment<'static>, name: &str, ctx: Value) -> Result<String, Error> {
        env.get_template(name)?.render(ctx)
    }

    #[test]
    fn test_contains() {
        let seq = Value::from(vec!["a", "b", "c"]);
        assert!(contains(seq.clone(), Value::from("b")).unwrap());
        assert!(!contains(seq, Value::from("z")).unwrap());
        assert!(contains(Value::from("brown fox"), Value::from("fox")).unwrap());
        assert!(!contains(Value::from(()), Value::from("z")).unwrap());
    }

    #[test]
    fn test_contains_rejects_non_sequence() {
        let err = contains(Value::from(42), Value::from("z")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_contains_in_template() {
        let env = env_with(
            &[("t.html", "{{ contains(items, 'b') }}/{{ contains(items, 'z') }}")],
            &Helpers::default(),
        );
        let out = render(&env, "t.html", context! { items => vec!["a", "b", "c"] }).unwrap();
        assert_eq!(out, "True/False");
    }

    #[test]
    fn test_nl2br_escapes_then_breaks() {
        let env = env_with(&[("t.html", "{{ nl2br(text) }}")], &Helpers::default());
        let out = render(&env, "t.html", context! { text => "a<b>\nc" }).unwrap();
        assert_eq!(out, "a&lt;b&gt;<br>c");

        let out = render(&env, "t.html", context! { text => "\"x\" & 'y'" }).unwrap();
        assert_eq!(out, "&quot;x&quot; &amp; &#x27;y&#x27;");
    }

    #[test]
    fn test_raw_is_not_escaped() {
        let env = env_with(&[("t.html", "{{ raw(text) }}|{{ text }}")], &Helpers::default());
        let out = render(&env, "t.html", context! { text => "<b>" }).unwrap();
        assert_eq!(out, "<b>|&lt;b&gt;");
    }

    #[test]
    fn test_url_uses_router() {
        let helpers =
            Helpers::default().with_router(RouteTable::new().with_route("user", "/users/{id}"));
        let env = env_with(&[("t.html", "{{ url('user', 7) }}")], &helpers);
        assert_eq!(render(&env, "t.html", context! {}).unwrap(), "/users/7");
    }

    #[test]
    fn test_url_params_cannot_break_out() {
        let helpers =
            Helpers::default().with_router(RouteTable::new().with_route("user", "/users/{id}"));
        let env = env_with(&[("t.html", "<a href=\"{{ url('user', id) }}\">")], &helpers);
        let out = render(&env, "t.html", context! { id => "\"><script>/x" }).unwrap();
        assert_eq!(out, "<a href=\"/users/%22%3E%3Cscript%3E%2Fx\">");
    }

    #[test]
    fn test_unknown_route_is_usage_error() {
        let env = env_with(&[("t.html", "{{ url('nowhere') }}")], &Helpers::default());
        let err = render(&env, "t.html", context! {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_invoke_template_selects_variant() {
        let env = env_with(
            &[
                ("page.html", "[{{ invoke_template(unit, 'MobileNav', 'nav', ctx) }}]"),
                ("mobile_nav.html", "mobile {{ title }}"),
                ("nav.html", "desktop {{ title }}"),
            ],
            &Helpers::default(),
        );
        let mobile = render(
            &env,
            "page.html",
            context! { unit => true, ctx => context! { title => "Home" } },
        )
        .unwrap();
        assert_eq!(mobile, "[mobile Home]");

        let desktop = render(
            &env,
            "page.html",
            context! { unit => false, ctx => context! { title => "Home" } },
        )
        .unwrap();
        assert_eq!(desktop, "[desktop Home]");
    }

    #[test]
    fn test_invoke_template_without_context() {
        let env = env_with(
            &[
                ("page.html", "{{ invoke_template(false, 'x', 'plain') }}"),
                ("plain.html", "<i>plain</i>"),
            ],
            &Helpers::default(),
        );
        assert_eq!(render(&env, "page.html", context! {}).unwrap(), "<i>plain</i>");
    }

    #[test]
    fn test_invoke_template_rejects_extra_context() {
        let env = env_with(
            &[
                ("page.html", "{{ invoke_template(false, 'x', 'plain', 1, 2) }}"),
                ("plain.html", "plain"),
            ],
            &Helpers::default(),
        );
        let err = render(&env, "page.html", context! {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_invoke_template_skips_layout_names() {
        let env = env_with(
            &[
                ("page.html", "{{ invoke_template(false, 'x', '/layouts/app') }}"),
                ("/layouts/app.html", "LAYOUT[{{ yield }}]"),
            ],
            &Helpers::default(),
        );
        let err = render(&env, "page.html", context! {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_invoke_template_missing_partial_fails() {
        let env = env_with(
            &[("page.html", "{{ invoke_template(true, 'gone', 'also_gone') }}")],
            &Helpers::default(),
        );
        let err = render(&env, "page.html", context! {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_date() {
        assert_eq!(
            date(Value::from(0), "%Y-%m-%d %H:%M".to_string()).unwrap(),
            "1970-01-01 00:00"
        );
        assert_eq!(
            date(Value::from("2024-02-29T12:30:00Z"), "%d/%m/%Y".to_string()).unwrap(),
            "29/02/2024"
        );
        assert!(date(Value::from(0), "%Q".to_string()).is_err());
        assert!(date(Value::from(vec![1]), "%Y".to_string()).is_err());
    }
}
