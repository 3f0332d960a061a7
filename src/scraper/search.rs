//! Opening the reservation site and running the keyword search.

use crate::browser::{Browser, Query, first_visible, wait_for};
use crate::scraper::context::{self, NavigationContext};
use crate::scraper::errors::EngineError;
use std::time::Duration;
use tracing::{debug, info};

const SEARCH_INPUT_CSS: &str = "input[type='search'], input[placeholder*='検索'], \
     input[name*='keyword'], input[type='text']";

/// Where to search and how to recognise the screens involved.
#[derive(Debug, Clone)]
pub struct SearchSetup {
    pub target_url: String,
    /// Text present on the screen that holds the search box.
    pub search_marker: String,
    /// Text present on the results screen that lists facilities.
    pub results_marker: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl SearchSetup {
    /// Load the site, submit `keyword` and return the context showing the results.
    pub async fn run(
        &self,
        browser: &dyn Browser,
        keyword: &str,
    ) -> Result<NavigationContext, EngineError> {
        browser.navigate(&self.target_url).await?;
        let epoch = browser.page_epoch().await?;
        let ctx = context::resolve(browser, NavigationContext::top(epoch), &self.search_marker)
            .await?
            .context();

        let query = Query::css(SEARCH_INPUT_CSS);
        if wait_for(browser, ctx.frame, &query, self.wait_timeout, self.poll_interval)
            .await?
            .is_none()
        {
            return Err(EngineError::NavigationTimeout {
                what: "search input".to_string(),
                waited: self.wait_timeout,
            });
        }
        let Some(input) = first_visible(browser, ctx.frame, &query).await? else {
            return Err(EngineError::NavigationTimeout {
                what: "visible search input".to_string(),
                waited: self.wait_timeout,
            });
        };

        browser.submit_text(&input, keyword).await?;
        debug!(keyword, frame = ?ctx.frame, "Search submitted");

        let resolved = context::resolve(browser, ctx, &self.results_marker).await?;
        info!(keyword, found = resolved.is_found(), "Search results opened");
        Ok(resolved.context())
    }
}
