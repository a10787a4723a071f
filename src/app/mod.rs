pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod publish;
pub mod runtime;
pub mod spam;
pub mod types;
pub mod webdriver;

pub use runtime::run;
