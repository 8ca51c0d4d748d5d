//! Hack The Box API client.
//!
//! Assembles a `StatsSnapshot` for one account from three endpoints:
//! the basic profile (mandatory), the country leaderboard and the
//! challenge progress (both best-effort).

use std::error::Error as StdError;
use std::time::Duration;

use common::config::StatsConfig;
use common::{Error, StatsSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

/// HTB API client bound to the tracked account.
#[derive(Debug, Clone)]
pub struct HtbClient {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
    token: Option<String>,
}

// ── HTB response types ────────────────────────────────────────────────

/// Response from `/user/profile/basic/{user_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub system_owns: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub user_owns: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub system_bloods: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub user_bloods: Option<u64>,
    #[serde(default)]
    pub rank: Option<String>,
    /// Global ranking position.
    #[serde(default, deserialize_with = "lenient_count")]
    pub ranking: Option<u64>,
}

/// Response from `/rankings/country/{code}/members`.
#[derive(Debug, Default, Deserialize)]
pub struct CountryRankingsResponse {
    #[serde(default)]
    pub data: Option<CountryRankingsData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountryRankingsData {
    #[serde(default)]
    pub rankings: Vec<RankingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub rank: Option<u64>,
}

/// Response from `/user/profile/progress/challenges/{user_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeProgressResponse {
    #[serde(default)]
    pub profile: Option<ChallengeProgressProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeProgressProfile {
    #[serde(default)]
    pub challenge_owns: Option<ChallengeOwns>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeOwns {
    #[serde(default, deserialize_with = "lenient_count")]
    pub solved: Option<u64>,
}

/// Accepts a non-negative integer, a numeric string, or null.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

// ── Helpers ───────────────────────────────────────────────────────────

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so DNS/TLS/timeout failures are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 500;
    let compact = raw.replace(['\n', '\r'], " ");
    match compact.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &compact[..idx]),
        None => compact,
    }
}

/// Country codes end up in a URL path, so only ASCII letters and digits pass.
fn is_country_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// First leaderboard entry whose name equals `name` exactly.
fn find_local_rank(rankings: &[RankingEntry], name: &str) -> Option<u64> {
    rankings
        .iter()
        .find(|entry| entry.name.as_deref() == Some(name))
        .and_then(|entry| entry.rank)
}

// ── Implementation ────────────────────────────────────────────────────

impl HtbClient {
    pub fn new(cfg: &StatsConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.upstream.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(cfg.upstream.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&cfg.upstream.base_url),
            user_id: cfg.user_id.clone(),
            token: cfg.token.clone(),
        })
    }

    fn credentials(&self) -> Result<(&str, &str), Error> {
        match (non_blank(&self.user_id), non_blank(&self.token)) {
            (Some(user_id), Some(token)) => Ok((user_id, token)),
            _ => Err(Error::Config("USER_ID or TOKEN not configured".into())),
        }
    }

    /// Authenticated GET of `path`, decoded as JSON.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::HtbApi {
                status: status.as_u16(),
                message: summarize_response_body(&body),
            });
        }

        resp.json()
            .await
            .map_err(|e| Error::Http(format!("JSON decode error for {}: {}", path, format_reqwest_error(&e))))
    }

    /// Fetch the basic profile of the tracked account.
    pub async fn fetch_profile(&self) -> Result<Profile, Error> {
        let (user_id, token) = self.credentials()?;
        let resp: ProfileResponse = self
            .get_json(&format!("/user/profile/basic/{}", user_id), token)
            .await?;
        Ok(resp.profile.unwrap_or_default())
    }

    /// Look up `name` in the country leaderboard.
    ///
    /// `Ok(None)` means the call worked but the user is not listed.
    pub async fn fetch_local_rank(&self, country_code: &str, name: &str) -> Result<Option<u64>, Error> {
        let (_, token) = self.credentials()?;
        if !is_country_code(country_code) {
            return Err(Error::MissingIdentity);
        }
        let resp: CountryRankingsResponse = self
            .get_json(&format!("/rankings/country/{}/members", country_code), token)
            .await?;
        let rankings = resp.data.map(|d| d.rankings).unwrap_or_default();
        debug!("Country {} leaderboard has {} entries", country_code, rankings.len());
        Ok(find_local_rank(&rankings, name))
    }

    /// Number of solved challenges.
    pub async fn fetch_challenge_owns(&self) -> Result<u64, Error> {
        let (user_id, token) = self.credentials()?;
        let resp: ChallengeProgressResponse = self
            .get_json(&format!("/user/profile/progress/challenges/{}", user_id), token)
            .await?;
        Ok(resp
            .profile
            .and_then(|p| p.challenge_owns)
            .and_then(|c| c.solved)
            .unwrap_or_default())
    }

    /// Fetch and combine all three endpoints.
    ///
    /// Only the profile call can fail the snapshot; leaderboard and challenge
    /// failures degrade to an omitted `Local_Rank` and zero `Challenge_Owns`.
    pub async fn fetch_snapshot(&self) -> Result<StatsSnapshot, Error> {
        let profile = self.fetch_profile().await?;

        let (Some(name), Some(country_code)) = (
            non_blank(&profile.name),
            non_blank(&profile.country_code).filter(|c| is_country_code(c)),
        ) else {
            warn!("Profile response lacks a name or country code");
            return Err(Error::MissingIdentity);
        };

        let (local_rank, challenge_owns) = tokio::join!(
            self.fetch_local_rank(country_code, name),
            self.fetch_challenge_owns(),
        );

        let local_rank = local_rank.unwrap_or_else(|e| {
            warn!("Country leaderboard unavailable, omitting local rank: {}", e);
            None
        });
        let challenge_owns = challenge_owns.unwrap_or_else(|e| {
            warn!("Challenge progress unavailable, defaulting to 0: {}", e);
            0
        });

        info!(
            "Fetched HTB stats: rank={:?} global={:?} local={:?} challenges={}",
            profile.rank, profile.ranking, local_rank, challenge_owns
        );

        Ok(StatsSnapshot {
            rank: profile.rank.clone().unwrap_or_default(),
            global_rank: profile.ranking.unwrap_or_default(),
            local_rank,
            system_owns: profile.system_owns.unwrap_or_default(),
            user_owns: profile.user_owns.unwrap_or_default(),
            challenge_owns,
            system_bloods: profile.system_bloods.unwrap_or_default(),
            user_bloods: profile.user_bloods.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_secs: u64) -> HtbClient {
        let mut cfg = StatsConfig {
            user_id: Some("1337".into()),
            token: Some("tok".into()),
            ..StatsConfig::default()
        };
        cfg.upstream.base_url = format!("{}/", server.uri());
        cfg.upstream.timeout_secs = timeout_secs;
        HtbClient::new(&cfg).unwrap()
    }

    fn profile_body(name: &str, country: &str) -> serde_json::Value {
        json!({
            "profile": {
                "id": 1337,
                "name": name,
                "country_code": country,
                "system_owns": 40,
                "user_owns": 43,
                "system_bloods": 1,
                "user_bloods": 2,
                "rank": "Pro Hacker",
                "ranking": 812
            }
        })
    }

    async fn mount_profile(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/user/profile/basic/1337"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_rankings(server: &MockServer, country: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/rankings/country/{}/members", country)))
            .respond_with(template)
            .mount(server)
            .await;
    }

    async fn mount_challenges(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/user/profile/progress/challenges/1337"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn rankings_body() -> serde_json::Value {
        json!({
            "data": {
                "rankings": [
                    {"name": "bob", "rank": 1},
                    {"name": "Alice", "rank": 2},
                    {"name": "alice", "rank": 7},
                    {"name": "alice", "rank": 9}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_full_snapshot() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("alice", "GR")).await;
        mount_rankings(&server, "GR", ResponseTemplate::new(200).set_body_json(rankings_body())).await;
        mount_challenges(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"profile": {"challenge_owns": {"solved": 27, "total": 500}}})),
        )
        .await;

        let snapshot = client_for(&server, 10).fetch_snapshot().await.unwrap();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                rank: "Pro Hacker".into(),
                global_rank: 812,
                // case-sensitive, first match wins
                local_rank: Some(7),
                system_owns: 40,
                user_owns: 43,
                challenge_owns: 27,
                system_bloods: 1,
                user_bloods: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_leaderboard_timeout_omits_local_rank() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("alice", "GR")).await;
        mount_rankings(
            &server,
            "GR",
            ResponseTemplate::new(200)
                .set_body_json(rankings_body())
                .set_delay(Duration::from_secs(3)),
        )
        .await;
        mount_challenges(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"profile": {"challenge_owns": {"solved": 5}}})),
        )
        .await;

        let snapshot = client_for(&server, 1).fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.local_rank, None);
        assert_eq!(snapshot.challenge_owns, 5);
        assert!(!snapshot.to_fields().unwrap().contains_key("Local_Rank"));
    }

    #[tokio::test]
    async fn test_no_leaderboard_match_omits_local_rank() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("carol", "GR")).await;
        mount_rankings(&server, "GR", ResponseTemplate::new(200).set_body_json(rankings_body())).await;
        mount_challenges(&server, ResponseTemplate::new(200).set_body_json(json!({}))).await;

        let snapshot = client_for(&server, 10).fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.local_rank, None);
    }

    #[tokio::test]
    async fn test_challenge_500_defaults_to_zero() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("alice", "GR")).await;
        mount_rankings(&server, "GR", ResponseTemplate::new(200).set_body_json(rankings_body())).await;
        mount_challenges(&server, ResponseTemplate::new(500).set_body_string("boom")).await;

        let snapshot = client_for(&server, 10).fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.challenge_owns, 0);
        assert_eq!(snapshot.local_rank, Some(7));
        assert_eq!(snapshot.system_owns, 40);
        assert_eq!(snapshot.rank, "Pro Hacker");
    }

    #[tokio::test]
    async fn test_empty_country_code_is_identity_error() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("alice", "")).await;

        let err = client_for(&server, 10).fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, Error::MissingIdentity));
        assert_eq!(err.to_string(), "Could not retrieve user profile");
    }

    #[tokio::test]
    async fn test_malformed_country_code_is_identity_error() {
        let server = MockServer::start().await;
        mount_profile(&server, profile_body("alice", "GR/../../user/info?x=")).await;

        let err = client_for(&server, 10).fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, Error::MissingIdentity));
        // Only the profile call went out.
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
    }

    #[tokio::test]
    async fn test_matched_entry_without_rank_omits_local_rank() {
        for rank in [json!(null), json!("n/a"), json!(-3)] {
            let server = MockServer::start().await;
            mount_profile(&server, profile_body("alice", "GR")).await;
            mount_rankings(
                &server,
                "GR",
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": {"rankings": [{"name": "alice", "rank": rank}]}
                })),
            )
            .await;
            mount_challenges(&server, ResponseTemplate::new(200).set_body_json(json!({}))).await;

            let snapshot = client_for(&server, 10).fetch_snapshot().await.unwrap();
            assert_eq!(snapshot.local_rank, None, "rank {rank}");
            assert!(!snapshot.to_fields().unwrap().contains_key("Local_Rank"));
        }
    }

    #[test]
    fn test_is_country_code() {
        assert!(is_country_code("GR"));
        assert!(is_country_code("us"));
        assert!(!is_country_code(""));
        assert!(!is_country_code("G/R"));
        assert!(!is_country_code("GR?x=1"));
    }

    #[tokio::test]
    async fn test_profile_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/profile/basic/1337"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server, 10).fetch_snapshot().await.unwrap_err();
        match err {
            Error::HtbApi { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let server = MockServer::start().await;
        let mut cfg = StatsConfig {
            user_id: Some("1337".into()),
            token: Some("   ".into()),
            ..StatsConfig::default()
        };
        cfg.upstream.base_url = server.uri();
        let client = HtbClient::new(&cfg).unwrap();

        let err = client.fetch_snapshot().await.unwrap_err();
        assert_eq!(err.to_string(), "Config error: USER_ID or TOKEN not configured");
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_lenient_counts() {
        let profile: Profile = serde_json::from_value(json!({
            "name": "alice",
            "country_code": "GR",
            "system_owns": "12",
            "user_owns": null,
            "ranking": "unranked"
        }))
        .unwrap();
        assert_eq!(profile.system_owns, Some(12));
        assert_eq!(profile.user_owns, None);
        assert_eq!(profile.ranking, None);
        assert_eq!(profile.system_bloods, None);
    }

    #[test]
    fn test_summarize_response_body() {
        assert_eq!(summarize_response_body("a\nb\rc"), "a b c");
        let long = "x".repeat(600);
        let summary = summarize_response_body(&long);
        assert!(summary.ends_with('…'));
        assert_eq!(summary.chars().count(), 501);
    }
}
