//! Generic JSON-over-HTTP odds provider.
//!
//! Expects `GET {base_url}/odds?home=..&away=..[&league=..]` to answer with
//! `{"home": 2.1, "draw": 3.4, "away": 3.6}`. An API key, when configured,
//! is sent in the `x-api-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::OddsProvider;
use crate::types::Odds;

/// Quote body returned by an odds endpoint.
#[derive(Debug, Deserialize)]
struct OddsResponse {
    #[serde(alias = "1")]
    home: f64,
    #[serde(alias = "x", alias = "X")]
    draw: f64,
    #[serde(alias = "2")]
    away: f64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl OddsResponse {
    fn into_odds(self, provider: &str) -> Odds {
        let mut odds = Odds::new(self.home, self.draw, self.away).with_source(provider);
        odds.timestamp = Some(self.timestamp.unwrap_or_else(Utc::now));
        odds
    }
}

pub struct HttpOddsProvider {
    name: String,
    base_url: String,
    api_key: Option<Secret<String>>,
    reliability: f64,
    http: Client,
}

impl HttpOddsProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        reliability: f64,
        timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("betting-engine/0.1.0")
            .build()
            .context(format!("Failed to build HTTP client for {name}"))?;

        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.map(Secret::new),
            reliability: reliability.clamp(0.0, 1.0),
            http,
        })
    }

    fn odds_url(&self, home: &str, away: &str, league: Option<&str>) -> String {
        let mut url = format!(
            "{}/odds?home={}&away={}",
            self.base_url,
            urlencoding::encode(home),
            urlencoding::encode(away),
        );
        if let Some(league) = league {
            url.push_str("&league=");
            url.push_str(&urlencoding::encode(league));
        }
        url
    }
}

#[async_trait]
impl OddsProvider for HttpOddsProvider {
    async fn fetch_odds(&self, home: &str, away: &str, league: Option<&str>) -> Result<Odds> {
        let url = self.odds_url(home, away, league);
        debug!(provider = %self.name, url = %url, "Fetching odds");

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret().as_str());
        }

        let resp = request
            .send()
            .await
            .context(format!("{} odds request failed", self.name))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} odds API error {status}: {body}", self.name);
        }

        let body: OddsResponse = resp
            .json()
            .await
            .context(format!("Failed to parse {} odds response", self.name))?;

        Ok(body.into_odds(&self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reliability(&self) -> f64 {
        self.reliability
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base: &str) -> HttpOddsProvider {
        HttpOddsProvider::new("books", base, Some("k".into()), 0.9, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_odds_url_encodes_teams() {
        let p = provider("https://odds.example.com/v1/");
        assert_eq!(
            p.odds_url("Man Utd", "Brighton & Hove", Some("Premier League")),
            "https://odds.example.com/v1/odds?home=Man%20Utd&away=Brighton%20%26%20Hove&league=Premier%20League"
        );
        assert_eq!(
            p.odds_url("A", "B", None),
            "https://odds.example.com/v1/odds?home=A&away=B"
        );
    }

    #[test]
    fn test_parse_response() {
        let body: OddsResponse =
            serde_json::from_str(r#"{"home": 2.1, "draw": 3.4, "away": 3.6}"#).unwrap();
        let odds = body.into_odds("books");
        assert_eq!(odds.home, 2.1);
        assert_eq!(odds.source.as_deref(), Some("books"));
        assert!(odds.timestamp.is_some());
    }

    #[test]
    fn test_parse_1x2_aliases() {
        let body: OddsResponse =
            serde_json::from_str(r#"{"1": 1.9, "x": 3.5, "2": 4.2}"#).unwrap();
        assert_eq!(body.draw, 3.5);
        assert_eq!(body.away, 4.2);
    }

    #[test]
    fn test_reliability_clamped() {
        let p = HttpOddsProvider::new("x", "http://h", None, 1.7, Duration::from_secs(1)).unwrap();
        assert_eq!(p.reliability(), 1.0);
        assert_eq!(p.name(), "x");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let p = HttpOddsProvider::new("x", "http://127.0.0.1:9", None, 1.0, Duration::from_millis(500))
            .unwrap();
        assert!(p.fetch_odds("A", "B", None).await.is_err());
    }
}
