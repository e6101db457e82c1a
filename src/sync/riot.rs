//! Riot Games TFT API client.
//!
//! Ladder, summoner and match endpoints. All Riot API specifics (hosts,
//! paths, payload shapes) are isolated in this module. Raw payloads are
//! converted into the strict `MatchInfo` shape here, so nothing downstream
//! sees untyped data.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::calculate::valid_placement;
use crate::fetch::{FetchError, Fetcher};
use crate::models::{ItemId, MatchInfo, Participant, Unit};

use super::MatchSource;

/// Header carrying the API key.
pub const RIOT_TOKEN_HEADER: &str = "X-Riot-Token";

/// Failed to parse a ladder/routing label.
#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

fn parse_label<T: Copy>(
    kind: &'static str,
    all: &[T],
    as_str: fn(&T) -> &'static str,
    s: &str,
) -> Result<T, UnknownLabel> {
    all.iter()
        .copied()
        .find(|v| as_str(v).eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownLabel {
            kind,
            value: s.to_string(),
        })
}

// ── Routing and ladder labels ───────────────────────────────────────────────

/// Platform routing value (summoner and league endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Na1,
    Euw1,
    Eun1,
    Kr,
    Br1,
    La1,
    La2,
    Oc1,
    Tr1,
    Ru,
    Jp1,
}

impl Platform {
    pub const ALL: [Platform; 11] = [
        Platform::Na1,
        Platform::Euw1,
        Platform::Eun1,
        Platform::Kr,
        Platform::Br1,
        Platform::La1,
        Platform::La2,
        Platform::Oc1,
        Platform::Tr1,
        Platform::Ru,
        Platform::Jp1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Na1 => "NA1",
            Platform::Euw1 => "EUW1",
            Platform::Eun1 => "EUN1",
            Platform::Kr => "KR",
            Platform::Br1 => "BR1",
            Platform::La1 => "LA1",
            Platform::La2 => "LA2",
            Platform::Oc1 => "OC1",
            Platform::Tr1 => "TR1",
            Platform::Ru => "RU",
            Platform::Jp1 => "JP1",
        }
    }

    pub fn host(&self) -> String {
        format!("{}.api.riotgames.com", self.as_str().to_lowercase())
    }
}

/// Regional routing value (match endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Americas,
    Europe,
    Asia,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Americas, Region::Europe, Region::Asia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Americas => "AMERICAS",
            Region::Europe => "EUROPE",
            Region::Asia => "ASIA",
        }
    }

    pub fn host(&self) -> String {
        format!("{}.api.riotgames.com", self.as_str().to_lowercase())
    }
}

/// Ranked tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Challenger,
    Grandmaster,
    Master,
    Diamond,
    Emerald,
    Platinum,
    Gold,
    Silver,
    Bronze,
    Iron,
}

impl Tier {
    pub const ALL: [Tier; 10] = [
        Tier::Challenger,
        Tier::Grandmaster,
        Tier::Master,
        Tier::Diamond,
        Tier::Emerald,
        Tier::Platinum,
        Tier::Gold,
        Tier::Silver,
        Tier::Bronze,
        Tier::Iron,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Challenger => "CHALLENGER",
            Tier::Grandmaster => "GRANDMASTER",
            Tier::Master => "MASTER",
            Tier::Diamond => "DIAMOND",
            Tier::Emerald => "EMERALD",
            Tier::Platinum => "PLATINUM",
            Tier::Gold => "GOLD",
            Tier::Silver => "SILVER",
            Tier::Bronze => "BRONZE",
            Tier::Iron => "IRON",
        }
    }

    /// Apex tiers have a single league list instead of paged divisions.
    pub fn is_apex(&self) -> bool {
        matches!(self, Tier::Challenger | Tier::Grandmaster | Tier::Master)
    }
}

/// Division within a non-apex tier.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Division {
    I,
    II,
    III,
    IV,
}

impl Division {
    pub const ALL: [Division; 4] = [Division::I, Division::II, Division::III, Division::IV];

    pub fn as_str(&self) -> &'static str {
        match self {
            Division::I => "I",
            Division::II => "II",
            Division::III => "III",
            Division::IV => "IV",
        }
    }
}

macro_rules! label_impls {
    ($($ty:ident => $kind:literal),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = UnknownLabel;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    parse_label($kind, &$ty::ALL, $ty::as_str, s)
                }
            }
        )*
    };
}

label_impls!(
    Platform => "platform",
    Region => "region",
    Tier => "tier",
    Division => "division",
);

// ── Raw API payloads ────────────────────────────────────────────────────────

/// One ladder entry. Newer payloads carry `puuid` directly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntry {
    #[serde(default)]
    pub summoner_id: Option<String>,
    #[serde(default)]
    pub puuid: Option<String>,
}

/// Apex tier league list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeagueList {
    #[serde(default)]
    pub entries: Vec<LeagueEntry>,
}

/// Summoner lookup response.
#[derive(Debug, Clone, Deserialize)]
pub struct Summoner {
    pub puuid: String,
}

/// Accept any JSON for `items`; keep only integer elements of a list.
fn deserialize_lenient_items<'de, D>(deserializer: D) -> Result<Vec<ItemId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    })
}

/// Treat `null` like a missing list.
fn deserialize_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let maybe: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(maybe.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUnit {
    #[serde(default)]
    pub character_id: String,
    #[serde(default, deserialize_with = "deserialize_lenient_items")]
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawParticipant {
    #[serde(default)]
    pub placement: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub units: Vec<RawUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchInfo {
    #[serde(default)]
    pub game_version: String,
    #[serde(default)]
    pub participants: Option<Vec<RawParticipant>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchMetadata {
    #[serde(default)]
    pub match_id: Option<String>,
}

/// A match payload as returned by the match endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatch {
    #[serde(default)]
    pub metadata: Option<RawMatchMetadata>,
    #[serde(default)]
    pub info: Option<RawMatchInfo>,
}

impl RawMatch {
    pub fn match_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.match_id.as_deref()
    }

    /// Convert into a validated match. `None` when there is no participant list.
    ///
    /// Placements outside 1..=8 become missing. Units without a character
    /// id are dropped.
    pub fn into_match_info(self) -> Option<MatchInfo> {
        let match_id = self.match_id().unwrap_or("<unknown>").to_string();
        let info = self.info?;
        let participants = info.participants?;

        let participants = participants
            .into_iter()
            .map(|p| {
                let placement = valid_placement(p.placement);
                if placement.is_none() && p.placement.is_some() {
                    warn!(
                        "Match {}: placement {:?} out of range, treated as missing",
                        match_id, p.placement
                    );
                }

                let total = p.units.len();
                let units: Vec<Unit> = p
                    .units
                    .into_iter()
                    .filter(|u| !u.character_id.trim().is_empty())
                    .map(|u| Unit::new(u.character_id, u.items))
                    .collect();
                if units.len() < total {
                    warn!(
                        "Match {}: dropped {} units without a character id",
                        match_id,
                        total - units.len()
                    );
                }

                Participant { placement, units }
            })
            .collect();

        Some(MatchInfo {
            game_version: info.game_version,
            participants,
        })
    }
}

/// Parse a JSON array of raw match payloads (e.g. a saved API dump).
///
/// Elements that don't deserialize or lack participants are skipped and
/// counted; only a document that is not an array at all is an error.
pub fn parse_match_dump(text: &str) -> Result<(Vec<MatchInfo>, usize), serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    let total = values.len();

    let matches: Vec<MatchInfo> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawMatch>(v).ok())
        .filter_map(RawMatch::into_match_info)
        .collect();

    let skipped = total - matches.len();
    Ok((matches, skipped))
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Build an https URL from a host and raw path segments (percent-encoded here).
fn endpoint(host: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = Url::parse(&format!("https://{}/", host))
        .map_err(|e| FetchError::InvalidUrl(format!("Bad host {}: {}", host, e)))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(format!("Cannot-be-a-base URL for {}", host)))?
        .clear()
        .extend(segments);
    Ok(url)
}

/// Riot TFT API client.
pub struct RiotClient {
    fetcher: Fetcher,
    platform: Platform,
    region: Region,
    cache_matches: bool,
}

impl RiotClient {
    /// Create a new client. The fetcher must already send the API key header.
    pub fn new(fetcher: Fetcher, platform: Platform, region: Region, cache_matches: bool) -> Self {
        Self {
            fetcher,
            platform,
            region,
            cache_matches,
        }
    }

    fn league_entries_url(&self, tier: Tier, division: Division, page: u32) -> Result<Url, FetchError> {
        let mut url = endpoint(
            &self.platform.host(),
            &["tft", "league", "v1", "entries", tier.as_str(), division.as_str()],
        )?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }

    fn apex_league_url(&self, tier: Tier) -> Result<Url, FetchError> {
        let path = tier.as_str().to_lowercase();
        endpoint(&self.platform.host(), &["tft", "league", "v1", &path])
    }

    fn summoner_url(&self, summoner_id: &str) -> Result<Url, FetchError> {
        endpoint(
            &self.platform.host(),
            &["tft", "summoner", "v1", "summoners", summoner_id],
        )
    }

    fn match_ids_url(&self, puuid: &str, count: u32) -> Result<Url, FetchError> {
        let mut url = endpoint(
            &self.region.host(),
            &["tft", "match", "v1", "matches", "by-puuid", puuid, "ids"],
        )?;
        url.query_pairs_mut()
            .append_pair("start", "0")
            .append_pair("count", &count.to_string());
        Ok(url)
    }

    fn match_url(&self, match_id: &str) -> Result<Url, FetchError> {
        endpoint(
            &self.region.host(),
            &["tft", "match", "v1", "matches", match_id],
        )
    }
}

#[async_trait]
impl MatchSource for RiotClient {
    async fn ladder_page(
        &self,
        tier: Tier,
        division: Division,
        page: u32,
    ) -> Result<Vec<LeagueEntry>, FetchError> {
        let url = self.league_entries_url(tier, division, page)?;
        debug!("Riot: ladder {} {} page {}", tier, division, page);
        self.fetcher.get_json(&url).await
    }

    async fn apex_ladder(&self, tier: Tier) -> Result<Vec<LeagueEntry>, FetchError> {
        let url = self.apex_league_url(tier)?;
        debug!("Riot: apex ladder {}", tier);
        let list: LeagueList = self.fetcher.get_json(&url).await?;
        Ok(list.entries)
    }

    async fn puuid_for_summoner(&self, summoner_id: &str) -> Result<String, FetchError> {
        let url = self.summoner_url(summoner_id)?;
        let summoner: Summoner = self.fetcher.get_json(&url).await?;
        Ok(summoner.puuid)
    }

    async fn match_ids(&self, puuid: &str, count: u32) -> Result<Vec<String>, FetchError> {
        let url = self.match_ids_url(puuid, count)?;
        self.fetcher.get_json(&url).await
    }

    async fn get_match(&self, match_id: &str) -> Result<RawMatch, FetchError> {
        let url = self.match_url(match_id)?;
        if self.cache_matches {
            self.fetcher.get_json_cached(&url).await
        } else {
            self.fetcher.get_json(&url).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetcherConfig;
    use tempfile::TempDir;

    fn client(temp_dir: &TempDir) -> RiotClient {
        let fetcher = Fetcher::new(FetcherConfig {
            cache_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        RiotClient::new(fetcher, Platform::Euw1, Region::Europe, true)
    }

    #[test]
    fn test_label_parsing_case_insensitive() {
        assert_eq!("na1".parse::<Platform>().unwrap(), Platform::Na1);
        assert_eq!("Europe".parse::<Region>().unwrap(), Region::Europe);
        assert_eq!("grandmaster".parse::<Tier>().unwrap(), Tier::Grandmaster);
        assert_eq!("III".parse::<Division>().unwrap(), Division::III);
        assert!("NA2".parse::<Platform>().is_err());
        assert!("V".parse::<Division>().is_err());
    }

    #[test]
    fn test_label_serde_matches_display() {
        let json = serde_json::to_string(&Platform::Euw1).unwrap();
        assert_eq!(json, "\"EUW1\"");
        assert_eq!(Platform::Euw1.to_string(), "EUW1");

        let tier: Tier = serde_json::from_str("\"MASTER\"").unwrap();
        assert_eq!(tier, Tier::Master);
    }

    #[test]
    fn test_apex_tiers() {
        assert!(Tier::Challenger.is_apex());
        assert!(Tier::Master.is_apex());
        assert!(!Tier::Diamond.is_apex());
    }

    #[test]
    fn test_endpoint_urls() {
        let temp_dir = TempDir::new().unwrap();
        let c = client(&temp_dir);

        assert_eq!(
            c.league_entries_url(Tier::Diamond, Division::II, 3).unwrap().as_str(),
            "https://euw1.api.riotgames.com/tft/league/v1/entries/DIAMOND/II?page=3"
        );
        assert_eq!(
            c.apex_league_url(Tier::Grandmaster).unwrap().as_str(),
            "https://euw1.api.riotgames.com/tft/league/v1/grandmaster"
        );
        assert_eq!(
            c.match_ids_url("abc", 20).unwrap().as_str(),
            "https://europe.api.riotgames.com/tft/match/v1/matches/by-puuid/abc/ids?start=0&count=20"
        );
        assert_eq!(
            c.match_url("EUW1_123").unwrap().as_str(),
            "https://europe.api.riotgames.com/tft/match/v1/matches/EUW1_123"
        );
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let temp_dir = TempDir::new().unwrap();
        let url = client(&temp_dir).summoner_url("a/b c").unwrap();
        assert_eq!(
            url.as_str(),
            "https://euw1.api.riotgames.com/tft/summoner/v1/summoners/a%2Fb%20c"
        );
    }

    #[test]
    fn test_raw_match_conversion() {
        let raw: RawMatch = serde_json::from_str(
            r#"{
                "metadata": {"match_id": "NA1_1"},
                "info": {
                    "game_version": "Version 13.24.550.1234 (Dec 01 2023) [PUBLIC]",
                    "participants": [
                        {"placement": 1, "units": [
                            {"character_id": "TFT10_Jinx", "items": [44, 16]},
                            {"character_id": "TFT10_Vi"}
                        ]},
                        {"placement": 2, "units": [
                            {"character_id": "TFT10_Ahri", "items": "not-a-list"},
                            {"character_id": "TFT10_Ekko", "items": [1, "x", 3]}
                        ]},
                        {"units": null}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(raw.match_id(), Some("NA1_1"));
        let info = raw.into_match_info().unwrap();

        assert_eq!(info.participants.len(), 3);
        assert_eq!(info.participants[0].units[0].items, vec![44, 16]);
        assert!(info.participants[0].units[1].items.is_empty());
        assert!(info.participants[1].units[0].items.is_empty());
        assert_eq!(info.participants[1].units[1].items, vec![1, 3]);
        assert_eq!(info.participants[2].placement, None);
        assert!(info.participants[2].units.is_empty());
    }

    #[test]
    fn test_match_without_participants_dropped() {
        let no_participants: RawMatch =
            serde_json::from_str(r#"{"info": {"game_version": "13.24"}}"#).unwrap();
        assert!(no_participants.into_match_info().is_none());

        let no_info: RawMatch = serde_json::from_str(r#"{"metadata": {}}"#).unwrap();
        assert!(no_info.into_match_info().is_none());
    }

    #[test]
    fn test_parse_match_dump_skips_bad_elements() {
        let text = r#"[
            {"info": {"game_version": "13.24.1", "participants": [{"placement": 1, "units": []}]}},
            {"info": {"game_version": "13.24.1"}},
            {"info": "nonsense"},
            {"info": {"game_version": "13.24.1", "participants": [{"placement": 4, "units": []}]}}
        ]"#;

        let (matches, skipped) = parse_match_dump(text).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(skipped, 2);

        assert!(parse_match_dump(r#"{"info": {}}"#).is_err());
    }

    #[test]
    fn test_bogus_placement_survives_snapshot_reload() {
        use crate::config::AggregationConfig;
        use crate::storage::{load_state, SnapshotLabels};
        use crate::sync::accumulate_and_save;

        let text = r#"[
            {"info": {"game_version": "13.24.1", "participants": [
                {"placement": 0, "units": [{"character_id": "TFT10_Jinx", "items": [1]}]},
                {"placement": 42, "units": [{"character_id": "TFT10_Jinx", "items": [1]}]}
            ]}}
        ]"#;
        let (matches, _) = parse_match_dump(text).unwrap();
        assert_eq!(matches[0].participants[0].placement, None);
        assert_eq!(matches[0].participants[1].placement, None);

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("top_comps_MASTER_NA1.json");
        let labels = SnapshotLabels {
            platform: "NA1".to_string(),
            region: "AMERICAS".to_string(),
            tier: "MASTER".to_string(),
            division: "I".to_string(),
        };

        let summary =
            accumulate_and_save(&matches, &path, labels, &AggregationConfig::default(), true)
                .unwrap();
        assert_eq!(summary.total_picks, 2);

        let reloaded = load_state(&path).unwrap();
        assert_eq!(reloaded.total_picks(), 2);
        assert!(reloaded.iter().all(|e| e.placement_sum == 18 && e.wins == 0));
    }

    #[test]
    fn test_units_without_character_id_dropped() {
        let raw: RawMatch = serde_json::from_str(
            r#"{"info": {"game_version": "13.24.1", "participants": [
                {"placement": 3, "units": [
                    {"items": [1, 2]},
                    {"character_id": "  ", "items": [3]},
                    {"character_id": "TFT10_Vi", "items": [4]}
                ]}
            ]}}"#,
        )
        .unwrap();

        let info = raw.into_match_info().unwrap();
        let units = &info.participants[0].units;
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].character_id, "TFT10_Vi");
    }

    #[test]
    fn test_league_entry_shapes() {
        let entries: Vec<LeagueEntry> =
            serde_json::from_str(r#"[{"summonerId": "s1"}, {"puuid": "p2"}]"#).unwrap();
        assert_eq!(entries[0].summoner_id.as_deref(), Some("s1"));
        assert_eq!(entries[1].puuid.as_deref(), Some("p2"));

        let list: LeagueList = serde_json::from_str(r#"{"tier": "MASTER"}"#).unwrap();
        assert!(list.entries.is_empty());
    }
}
