//! Utility functions for loading proxy lists.

use crate::config::ProxyPoolConfig;
use crate::proxy::has_scheme;

use futures::future;
use log::{info, warn};
use reqwest::Client;
use std::collections::HashSet;

/// Fetch a raw list of proxies from a URL or file path.
pub(crate) async fn fetch_proxies_from_source(source: &str) -> Result<Vec<String>, reqwest::Error> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = Client::new();
        let response = client.get(source).send().await?.error_for_status()?;
        let content = response.text().await?;
        Ok(content.lines().map(str::to_string).collect())
    } else {
        match tokio::fs::read_to_string(source).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) => {
                warn!("Failed to read proxy list {}: {}", source, e);
                Ok(Vec::new())
            }
        }
    }
}

/// Clean up a proxy list.
///
/// Lines are trimmed, blanks and `#` comments dropped, `http://` added when no
/// scheme is given, and duplicates removed keeping the first occurrence.
pub fn normalize_proxy_list<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else if has_scheme(line) {
                Some(line.to_string())
            } else {
                Some(format!("http://{}", line))
            }
        })
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

/// Collect the inline proxies and every configured source into one normalized list.
pub(crate) async fn load_proxy_list(config: &ProxyPoolConfig) -> Vec<String> {
    info!("Loading proxies from {} sources", config.sources.len());

    let fetches = config.sources.iter().map(|source| async move {
        (source, fetch_proxies_from_source(source).await)
    });

    let mut lines = config.proxies.clone();
    for (source, result) in future::join_all(fetches).await {
        match result {
            Ok(source_proxies) => {
                info!("Fetched {} proxies from {}", source_proxies.len(), source);
                lines.extend(source_proxies);
            }
            Err(e) => {
                warn!("Failed to fetch proxies from {}: {}", source, e);
            }
        }
    }

    let proxies = normalize_proxy_list(lines);
    info!("Found {} unique proxies", proxies.len());
    proxies
}
