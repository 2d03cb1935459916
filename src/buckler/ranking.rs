//! League ranking and profile pages, read over HTTP with a logged-in session.

use std::sync::LazyLock;

use compact_str::{CompactString, ToCompactString};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, de::DeserializeOwned};
use tokio::io::AsyncBufReadExt;

use crate::{
    Error, Result,
    config::{Config, Urls},
    sampler::{Fighter, RankingSource, Rating},
    scrape::fetch_text,
};

#[allow(clippy::unwrap_used)]
static NEXT_DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());

#[derive(Deserialize)]
struct NextData<P> {
    props: Props<P>,
}

#[derive(Deserialize)]
struct Props<P> {
    #[serde(rename = "pageProps")]
    page_props: P,
}

#[derive(Deserialize)]
struct RankingProps {
    league_point_ranking: LeaguePointRanking,
}

#[derive(Deserialize)]
struct LeaguePointRanking {
    ranking_fighter_list: Vec<RankingFighter>,
}

#[derive(Deserialize)]
struct RankingFighter {
    fighter_banner_info: FighterBannerInfo,
    #[serde(default)]
    character_name: CompactString,
}

#[derive(Deserialize)]
struct FighterBannerInfo {
    personal_info: PersonalInfo,
}

#[derive(Deserialize)]
struct PersonalInfo {
    short_id: ShortId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShortId {
    Number(u64),
    Text(CompactString),
}

#[derive(Deserialize)]
struct ProfileProps {
    play: Play,
}

#[derive(Deserialize)]
struct Play {
    character_league_infos: Vec<CharacterLeagueInfo>,
}

#[derive(Deserialize)]
struct CharacterLeagueInfo {
    character_name: CompactString,
    league_info: LeagueInfo,
}

#[derive(Deserialize)]
struct LeagueInfo {
    #[serde(default)]
    master_rating: i64,
}

fn next_data<P: DeserializeOwned>(html: &str) -> Result<P> {
    let document = Html::parse_document(html);
    let script = document
        .select(&NEXT_DATA)
        .next()
        .ok_or_else(|| Error::parse("no __NEXT_DATA__ script"))?;
    let json = script.text().collect::<String>();
    let data: NextData<P> = serde_json::from_str(&json)
        .map_err(|e| Error::parse(format!("__NEXT_DATA__: {e}")))?;
    Ok(data.props.page_props)
}

pub fn parse_ranking_page(html: &str) -> Result<Vec<Fighter>> {
    let props: RankingProps = next_data(html)?;
    Ok(props
        .league_point_ranking
        .ranking_fighter_list
        .into_iter()
        .map(|f| Fighter {
            id: match f.fighter_banner_info.personal_info.short_id {
                ShortId::Number(n) => n.to_compact_string(),
                ShortId::Text(s) => s,
            },
            character: f.character_name,
        })
        .collect())
}

/// Best Master Rating over every character the fighter has played; the first
/// listed character wins a tie.
pub fn parse_profile_page(html: &str) -> Result<Rating> {
    let props: ProfileProps = next_data(html)?;
    props
        .play
        .character_league_infos
        .into_iter()
        .reduce(|best, c| {
            if c.league_info.master_rating > best.league_info.master_rating { c } else { best }
        })
        .map(|c| Rating {
            value: c.league_info.master_rating,
            character: c.character_name,
        })
        .ok_or_else(|| Error::parse("profile lists no characters"))
}

pub struct BucklerSource {
    client: Client,
    ranking_url: String,
    profile_base: String,
}

impl BucklerSource {
    #[must_use]
    pub fn new(client: Client, urls: &Urls) -> Self {
        Self {
            client,
            ranking_url: format!("{}?{}", urls.ranking_base, urls.ranking_query),
            profile_base: urls.profile_base.trim_end_matches('/').to_owned(),
        }
    }

    #[must_use]
    pub fn page_url(&self, page: u32) -> String {
        format!("{}&page={page}", self.ranking_url)
    }

    #[must_use]
    pub fn profile_url(&self, id: &str) -> String {
        format!("{}/{id}/play", self.profile_base)
    }
}

impl RankingSource for BucklerSource {
    async fn ranking_page(&mut self, stratum: &str, page: u32) -> Result<Vec<Fighter>> {
        let url = self.page_url(page);
        tracing::debug!(target: "buckler", "[{stratum}] GET {url}");
        let body = fetch_text(&self.client, &url).await?;
        parse_ranking_page(&body)
    }

    async fn best_rating(&mut self, fighter: &Fighter) -> Result<Rating> {
        let body = fetch_text(&self.client, &self.profile_url(&fighter.id)).await?;
        parse_profile_page(&body)
    }
}

/// Opens Buckler in a visible browser, waits for the operator to log in and
/// returns the session as a `Cookie` header value.
pub async fn login_cookies(config: &Config) -> Result<String> {
    let owned = config.clone();
    let (browser, page) = tokio::task::spawn_blocking(move || {
        let (browser, page) = super::open_browser(&owned, false)?;
        page.goto(&owned.urls.home).map_err(Error::Setup)?;
        Ok::<_, Error>((browser, page))
    })
    .await
    .map_err(|e| Error::Setup(e.into()))??;

    tracing::info!(target: "login", "\x1b[1;33mlog in to Buckler in the browser window, then press Enter here\x1b[0m");
    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    let cookie = tokio::task::spawn_blocking(move || {
        let cookie = page.cookie_header();
        drop(browser);
        cookie
    })
    .await
    .map_err(|e| Error::Setup(e.into()))?
    .map_err(Error::Setup)?;

    if cookie.is_empty() {
        return Err(Error::Setup(anyhow::anyhow!("browser holds no cookies after login")));
    }
    tracing::info!(target: "login", "captured {} cookies", cookie.split("; ").count());
    Ok(cookie)
}
