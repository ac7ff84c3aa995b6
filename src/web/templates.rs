//! HTML pages, embedded at compile time from `templates/` and rendered with
//! handlebars. Values are HTML-escaped by the registry's default escaper.

use handlebars::Handlebars;
use rust_embed::RustEmbed;
use serde_json::json;

use crate::errors::PageError;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates"]
struct Templates;

/// Registry of the bridge's pages (`form`, `result`, `error`).
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, PageError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_embed_templates_with_extension::<Templates>(".html")?;
        Ok(Self { registry })
    }

    /// The caption form, showing the images that will be posted.
    pub fn form_page(&self, image_urls: &[String], message: &str) -> Result<String, PageError> {
        let data = json!({ "images": image_urls, "message": message });
        Ok(self.registry.render("form", &data)?)
    }

    pub fn result_page(&self, result: &str, home_url: &str) -> Result<String, PageError> {
        let data = json!({ "result": result, "home_url": home_url });
        Ok(self.registry.render("result", &data)?)
    }

    pub fn error_page(&self, message: &str) -> Result<String, PageError> {
        Ok(self.registry.render("error", &json!({ "message": message }))?)
    }
}
