//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `tag`    | `Tag`            |
//! | `config` | `Config`         |

pub mod config;
pub mod serve;
pub mod tag;

pub use config::cmd_config;
pub use serve::cmd_serve;
pub use tag::cmd_tag;
