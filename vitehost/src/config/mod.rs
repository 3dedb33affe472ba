mod error;
mod options;
mod vitehost_toml;

pub use error::*;
pub use options::*;
pub use vitehost_toml::*;
