//! Layout-composed templates
//!
//! Template sources are discovered per application, compiled once at
//! startup into an immutable [`TemplateIndex`], and looked up per request.
//!
//! ```text
//! app/views/
//! ├── layouts/
//! │   └── application.html     layout "application", format "html"
//! ├── UserProfile.html         content "user_profile"
//! └── admin/index.html         content "admin/index"
//! ```
//!
//! A layout embeds its content through `{{ yield }}`:
//!
//! ```html
//! <html><body>{{ yield }}</body></html>
//! ```

mod helpers;
mod index;
mod naming;

pub use helpers::{contains, date, nl2br, raw, Helpers, PARTIAL_FORMAT};
pub use index::{
    AppTemplateSet, Template, TemplateIndex, TemplateIndexBuilder, TemplateSearchSpec, LAYOUT_DIR,
    LAYOUT_SLOT,
};
pub use naming::{split_ext, to_snake_case};
