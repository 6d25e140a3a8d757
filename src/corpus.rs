//! Page-to-verse lookups against an alquran.cloud compatible API.

use crate::page::PageNumber;
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One verse as it appears on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderUnit {
    /// Surah number.
    pub group_id: u32,
    /// Surah display name, e.g. "Al-Baqara".
    pub group_name: String,
    /// Ayah number within the surah.
    pub in_group_seq: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// Which flavour of page image to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Arabic,
    Translation,
}

impl Variant {
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Arabic => "arabic",
            Variant::Translation => "translation",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arabic" => Ok(Variant::Arabic),
            "translation" => Ok(Variant::Translation),
            other => Err(format!("unknown variant '{other}' (expected arabic or translation)")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("request for page {page} failed: {source}")]
    Http {
        page: PageNumber,
        #[source]
        source: reqwest::Error,
    },

    #[error("corpus API returned {status} for page {page}")]
    Status { page: PageNumber, status: u16 },

    #[error("malformed corpus response for page {page}: {detail}")]
    Malformed { page: PageNumber, detail: String },

    #[error("page {0} has no verses")]
    EmptyPage(PageNumber),
}

/// Source of the ordered verses on a page.
pub trait CorpusClient: Send + Sync {
    fn page_units(&self, page: PageNumber, variant: Variant) -> Result<Vec<RenderUnit>, CorpusError>;
}

#[derive(Deserialize)]
struct PageEnvelope {
    data: PageData,
}

#[derive(Deserialize)]
struct PageData {
    ayahs: Vec<ApiAyah>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAyah {
    text: String,
    number_in_surah: u32,
    surah: ApiSurah,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSurah {
    number: u32,
    english_name: String,
}

/// Blocking client for `{base_url}/page/{n}/{edition}`.
pub struct AlQuranCloudClient {
    client: Client,
    base_url: String,
    arabic_edition: String,
    translation_edition: String,
}

impl AlQuranCloudClient {
    pub fn new(
        base_url: &str,
        arabic_edition: &str,
        translation_edition: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build corpus HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            arabic_edition: arabic_edition.to_string(),
            translation_edition: translation_edition.to_string(),
        })
    }

    fn fetch_edition(&self, page: PageNumber, edition: &str) -> Result<Vec<ApiAyah>, CorpusError> {
        let url = format!("{}/page/{}/{}", self.base_url, page, edition);
        debug!("Fetching {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| CorpusError::Http { page, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CorpusError::Status {
                page,
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .map_err(|source| CorpusError::Http { page, source })?;
        parse_page(page, &body)
    }
}

fn parse_page(page: PageNumber, body: &str) -> Result<Vec<ApiAyah>, CorpusError> {
    let envelope: PageEnvelope = serde_json::from_str(body).map_err(|e| CorpusError::Malformed {
        page,
        detail: e.to_string(),
    })?;
    if envelope.data.ayahs.is_empty() {
        return Err(CorpusError::EmptyPage(page));
    }
    Ok(envelope.data.ayahs)
}

fn into_units(arabic: Vec<ApiAyah>) -> Vec<RenderUnit> {
    arabic
        .into_iter()
        .map(|ayah| RenderUnit {
            group_id: ayah.surah.number,
            group_name: ayah.surah.english_name,
            in_group_seq: ayah.number_in_surah,
            text: ayah.text,
            translation: None,
        })
        .collect()
}

/// Pairs translation verses with the Arabic ones by (surah, ayah).
fn attach_translations(
    page: PageNumber,
    units: &mut [RenderUnit],
    translated: Vec<ApiAyah>,
) -> Result<(), CorpusError> {
    if translated.len() != units.len() {
        return Err(CorpusError::Malformed {
            page,
            detail: format!(
                "translation has {} verses, arabic has {}",
                translated.len(),
                units.len()
            ),
        });
    }
    for (unit, ayah) in units.iter_mut().zip(translated) {
        if unit.group_id != ayah.surah.number || unit.in_group_seq != ayah.number_in_surah {
            return Err(CorpusError::Malformed {
                page,
                detail: format!(
                    "translation verse {}:{} does not line up with {}:{}",
                    ayah.surah.number, ayah.number_in_surah, unit.group_id, unit.in_group_seq
                ),
            });
        }
        unit.translation = Some(ayah.text);
    }
    Ok(())
}

impl CorpusClient for AlQuranCloudClient {
    fn page_units(&self, page: PageNumber, variant: Variant) -> Result<Vec<RenderUnit>, CorpusError> {
        let mut units = into_units(self.fetch_edition(page, &self.arabic_edition)?);
        if variant == Variant::Translation {
            let translated = self.fetch_edition(page, &self.translation_edition)?;
            attach_translations(page, &mut units, translated)?;
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_ONE: &str = r#"{
        "code": 200,
        "status": "OK",
        "data": {
            "number": 1,
            "ayahs": [
                {"number": 1, "text": "بِسْمِ ٱللَّهِ", "numberInSurah": 1, "juz": 1,
                 "surah": {"number": 1, "name": "سُورَةُ ٱلْفَاتِحَةِ", "englishName": "Al-Faatiha"}},
                {"number": 2, "text": "ٱلْحَمْدُ لِلَّهِ", "numberInSurah": 2, "juz": 1,
                 "surah": {"number": 1, "name": "سُورَةُ ٱلْفَاتِحَةِ", "englishName": "Al-Faatiha"}}
            ]
        }
    }"#;

    fn page(n: i64) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    #[test]
    fn test_parse_page_response() {
        let units = into_units(parse_page(page(1), PAGE_ONE).unwrap());
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].group_id, 1);
        assert_eq!(units[0].group_name, "Al-Faatiha");
        assert_eq!(units[1].in_group_seq, 2);
        assert!(units[0].translation.is_none());
    }

    #[test]
    fn test_malformed_response() {
        let err = parse_page(page(3), r#"{"data": {}}"#).err().unwrap();
        assert!(matches!(err, CorpusError::Malformed { .. }));
    }

    #[test]
    fn test_empty_page() {
        let err = parse_page(page(3), r#"{"data": {"ayahs": []}}"#).err().unwrap();
        assert!(matches!(err, CorpusError::EmptyPage(_)));
    }

    #[test]
    fn test_attach_translations() {
        let mut units = into_units(parse_page(page(1), PAGE_ONE).unwrap());
        let translated = parse_page(
            page(1),
            &PAGE_ONE
                .replace("بِسْمِ ٱللَّهِ", "In the name of Allah")
                .replace("ٱلْحَمْدُ لِلَّهِ", "All praise is for Allah"),
        )
        .unwrap();
        attach_translations(page(1), &mut units, translated).unwrap();
        assert_eq!(units[0].translation.as_deref(), Some("In the name of Allah"));
        assert_eq!(units[1].translation.as_deref(), Some("All praise is for Allah"));
    }

    #[test]
    fn test_attach_translations_length_mismatch() {
        let mut units = into_units(parse_page(page(1), PAGE_ONE).unwrap());
        units.pop();
        let translated = parse_page(page(1), PAGE_ONE).unwrap();
        assert!(attach_translations(page(1), &mut units, translated).is_err());
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Arabic".parse::<Variant>().unwrap(), Variant::Arabic);
        assert_eq!("translation".parse::<Variant>().unwrap(), Variant::Translation);
        assert!("latin".parse::<Variant>().is_err());
    }
}
