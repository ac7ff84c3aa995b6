//! Web front end of the bridge.
//!
//! ## Request Flow
//!
//! ```text
//! GET /          ── token in session? ── probe ok ──> resolve latest post ──> form
//!                        │ no / probe or resolve failed
//!                        v
//!                fresh OAuth state ──> 303 to the Facebook login dialog
//!
//! GET /callback  ── state matches? ──> exchange code ──> store token
//!                                          ──> resolve latest post ──> form
//!
//! POST /submit   ── download session image URLs ──> remember caption
//!                     ──> build styled text ──> publish to Bluesky ──> result page
//! ```
//!
//! | Module      | Responsibility                                       |
//! |-------------|------------------------------------------------------|
//! | `server`    | `ServerConfig`, router assembly, listener lifecycle  |
//! | `api`       | `AppState`, `ApiError`, route handlers               |
//! | `templates` | Embedded HTML pages rendered with handlebars         |

pub mod api;
pub mod server;
pub mod templates;
