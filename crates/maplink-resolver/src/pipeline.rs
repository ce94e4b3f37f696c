//! The staged resolution pipeline.
//!
//! Redirects are followed first; the terminal URL then runs through the
//! URL-pattern, page-scrape and render stages in that order, stopping at
//! the first stage that finds a valid coordinate pair.

use std::sync::Arc;
use std::time::Duration;

use maplink_core::{AppConfig, RegionFilter, ResolvedLocation};
use reqwest::{redirect, Client};

use crate::error::ResolveError;
use crate::page::{extract_from_html, fetch_page_html};
use crate::pattern::extract_from_url;
use crate::redirect::{follow_redirects, TerminalUrl, MAX_REDIRECTS};
use crate::render::{ChromiumRenderer, DisabledRenderer, PageRenderer};

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Found(ResolvedLocation),
    /// The stage ran to completion without an acceptable candidate.
    NotFound,
    /// The stage could not run (network failure, browser launch failure).
    /// Treated like `NotFound` by the pipeline but logged distinctly.
    StageError(String),
}

/// Extraction stages that run after the redirect stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    UrlPattern,
    PageScrape,
    Render,
}

impl Stage {
    pub const ORDER: [Stage; 3] = [Stage::UrlPattern, Stage::PageScrape, Stage::Render];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::UrlPattern => "url_pattern",
            Stage::PageScrape => "page_scrape",
            Stage::Render => "render",
        }
    }
}

/// Final answer for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Located(ResolvedLocation),
    /// Every stage came up empty; the terminal URL is still reported.
    Unlocated { resolved_url: String },
}

impl Resolution {
    #[must_use]
    pub fn resolved_url(&self) -> &str {
        match self {
            Resolution::Located(loc) => &loc.resolved_url,
            Resolution::Unlocated { resolved_url } => resolved_url,
        }
    }
}

/// Settings for the HTTP stages.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub region_filter: RegionFilter,
}

impl ResolverConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            http_timeout_secs: config.http_timeout_secs,
            user_agent: config.user_agent.clone(),
            region_filter: config.region_filter,
        }
    }
}

/// Resolves map links to coordinates. Cheap to clone; holds no
/// per-request state.
#[derive(Clone)]
pub struct Resolver {
    client: Client,
    user_agent: String,
    region: RegionFilter,
    renderer: Arc<dyn PageRenderer>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("user_agent", &self.user_agent)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Build a resolver around an explicit renderer.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Http`] if the HTTP client cannot be built.
    pub fn new(
        config: ResolverConfig,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent,
            region: config.region_filter,
            renderer,
        })
    }

    /// Build a resolver from process configuration, choosing the Chromium
    /// renderer unless rendering is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ResolveError> {
        let renderer: Arc<dyn PageRenderer> = if config.render_enabled {
            Arc::new(ChromiumRenderer::new(
                config.browser_path.clone(),
                config.region_filter,
            ))
        } else {
            Arc::new(DisabledRenderer)
        };
        Self::new(ResolverConfig::from_app_config(config), renderer)
    }

    /// Resolve `query` to a location.
    ///
    /// # Errors
    ///
    /// Only redirect-stage failures are returned; without a terminal URL no
    /// later stage has anything to work on. Later stage failures are logged
    /// and the pipeline moves on.
    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let terminal = follow_redirects(&self.client, query).await?;

        for stage in Stage::ORDER {
            match self.run_stage(stage, &terminal).await {
                StageOutcome::Found(location) => {
                    tracing::info!(
                        query,
                        stage = stage.name(),
                        lat = location.lat,
                        lon = location.lon,
                        "resolved coordinates"
                    );
                    return Ok(Resolution::Located(location));
                }
                StageOutcome::NotFound => {
                    tracing::debug!(query, stage = stage.name(), "no coordinates");
                }
                StageOutcome::StageError(reason) => {
                    tracing::warn!(query, stage = stage.name(), error = %reason, "stage failed");
                }
            }
        }

        tracing::info!(query, resolved_url = %terminal.decoded, "coordinates not found");
        Ok(Resolution::Unlocated {
            resolved_url: terminal.decoded,
        })
    }

    /// Run a single stage against an already-resolved terminal URL.
    pub async fn run_stage(&self, stage: Stage, terminal: &TerminalUrl) -> StageOutcome {
        match stage {
            Stage::UrlPattern => match extract_from_url(&terminal.decoded) {
                Some(m) => {
                    tracing::debug!(rule = m.rule, "matched URL rule");
                    StageOutcome::Found(ResolvedLocation::new(&terminal.decoded, m.coords))
                }
                None => StageOutcome::NotFound,
            },
            Stage::PageScrape => {
                let html = match fetch_page_html(&self.client, &terminal.raw, &self.user_agent).await
                {
                    Ok(html) => html,
                    Err(e) => return StageOutcome::StageError(e.to_string()),
                };
                match extract_from_html(&html, self.region) {
                    Some(m) => {
                        tracing::debug!(rule = m.rule, "matched HTML rule");
                        StageOutcome::Found(ResolvedLocation::new(&terminal.decoded, m.coords))
                    }
                    None => StageOutcome::NotFound,
                }
            }
            Stage::Render => self.renderer.render(&terminal.raw, &terminal.decoded).await,
        }
    }
}
