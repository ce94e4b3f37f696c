//! Resolve shortened map-service links to coordinates.
//!
//! Stages, cheapest first: follow redirects, match the terminal URL, scrape
//! the page HTML, render the page in a headless browser.

pub mod error;
pub mod page;
pub mod pattern;
pub mod pipeline;
pub mod redirect;
pub mod render;
mod rules;

pub use error::{RenderError, ResolveError};
pub use pipeline::{Resolution, Resolver, ResolverConfig, Stage, StageOutcome};
pub use redirect::{TerminalUrl, MAX_REDIRECTS};
pub use render::{ChromiumRenderer, DisabledRenderer, PageRenderer};
pub use rules::RuleMatch;
