use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A publication date as the provider reports it. Year-only and year-month
/// forms stay tagged so callers pick the truncation policy themselves instead
/// of receiving a silently coerced full date.
#[derive(Serialize, Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PartialDate {
    Year(i32),
    YearMonth(i32, u32),
    Full(NaiveDate),
}

impl PartialDate {
    /// Parse the provider's `YYYY`, `YYYY-MM` or `YYYY-MM-DD...` forms.
    /// Anything else is `None`, never an error.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.len() {
            4 => raw.parse::<i32>().ok().map(Self::Year),
            7 => {
                let (year, month) = raw.split_once('-')?;
                let year = year.parse::<i32>().ok()?;
                let month = month.parse::<u32>().ok()?;
                (1..=12).contains(&month).then_some(Self::YearMonth(year, month))
            }
            _ if raw.len() >= 10 => NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
                .ok()
                .map(Self::Full),
            _ => None,
        }
    }

    /// Truncate to a calendar date: the first of the month or of the year for
    /// partial forms. `None` only for out-of-range year/month combinations.
    #[must_use]
    #[inline]
    pub fn earliest(self) -> Option<NaiveDate> {
        match self {
            Self::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1),
            Self::YearMonth(year, month) => NaiveDate::from_ymd_opt(year, month, 1),
            Self::Full(date) => Some(date),
        }
    }
}

/// Normalized projection of one provider volume. Produced fresh per query,
/// never cached or persisted.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ExternalCandidate {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub published: Option<PartialDate>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub page_count: Option<i64>,
    pub categories: Vec<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub language: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub volume_id: Option<String>,
    pub preview_link: Option<String>,
    pub info_link: Option<String>,
    pub thumbnail: Option<String>,
}

impl ExternalCandidate {
    pub(crate) fn from_volume(volume: Volume) -> Self {
        let info = volume.volume_info;

        let mut isbn10 = None;
        let mut isbn13 = None;
        for identifier in info.industry_identifiers {
            match identifier.kind.as_str() {
                "ISBN_10" => isbn10 = identifier.identifier.as_deref().and_then(clean_text),
                "ISBN_13" => isbn13 = identifier.identifier.as_deref().and_then(clean_text),
                _ => {}
            }
        }

        Self {
            title: info.title.as_deref().and_then(clean_text),
            authors: info
                .authors
                .iter()
                .filter_map(|author| clean_text(author))
                .collect(),
            published: info.published_date.as_deref().and_then(PartialDate::parse),
            publisher: info.publisher.as_deref().and_then(clean_text),
            description: info.description.as_deref().and_then(clean_text),
            page_count: info.page_count,
            categories: info
                .categories
                .iter()
                .filter_map(|category| clean_text(category))
                .collect(),
            average_rating: info.average_rating,
            ratings_count: info.ratings_count,
            language: info.language.as_deref().and_then(clean_text),
            isbn10,
            isbn13,
            volume_id: volume.id.as_deref().and_then(clean_text),
            preview_link: info.preview_link,
            info_link: info.info_link,
            thumbnail: info.image_links.and_then(|links| links.thumbnail),
        }
    }
}

/// Wire shape of a `volumes` search response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumeList {
    #[serde(default)]
    pub(crate) total_items: i64,
    pub(crate) items: Option<Vec<Volume>>,
}

/// Wire shape of one volume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct VolumeInfo {
    pub(crate) title: Option<String>,
    pub(crate) authors: Vec<String>,
    pub(crate) published_date: Option<String>,
    pub(crate) publisher: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) page_count: Option<i64>,
    pub(crate) categories: Vec<String>,
    pub(crate) average_rating: Option<f64>,
    pub(crate) ratings_count: Option<i64>,
    pub(crate) language: Option<String>,
    pub(crate) preview_link: Option<String>,
    pub(crate) info_link: Option<String>,
    pub(crate) image_links: Option<ImageLinks>,
    pub(crate) industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageLinks {
    pub(crate) thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) identifier: Option<String>,
}

fn clean_text(raw: &str) -> Option<String> {
    let re = Regex::new(r"\s{2,}").expect("Regex must be valid");
    let cleaned = re.replace_all(raw.trim(), " ").to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_year_only() {
        assert_eq!(PartialDate::parse("1965"), Some(PartialDate::Year(1965)));
    }

    #[test]
    fn parses_year_month() {
        assert_eq!(
            PartialDate::parse("1965-08"),
            Some(PartialDate::YearMonth(1965, 8))
        );
        assert_eq!(PartialDate::parse("1965-13"), None);
    }

    #[test]
    fn parses_full_date_and_ignores_time_suffix() {
        let expected = PartialDate::Full(NaiveDate::from_ymd_opt(1965, 8, 1).unwrap());
        assert_eq!(PartialDate::parse("1965-08-01"), Some(expected));
        assert_eq!(PartialDate::parse("1965-08-01T00:00:00Z"), Some(expected));
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(PartialDate::parse(""), None);
        assert_eq!(PartialDate::parse("19"), None);
        assert_eq!(PartialDate::parse("not a date"), None);
        assert_eq!(PartialDate::parse("1965-xx-01"), None);
    }

    #[test]
    fn truncates_partial_dates_to_the_first() {
        assert_eq!(
            PartialDate::Year(1965).earliest(),
            NaiveDate::from_ymd_opt(1965, 1, 1)
        );
        assert_eq!(
            PartialDate::YearMonth(1965, 8).earliest(),
            NaiveDate::from_ymd_opt(1965, 8, 1)
        );
    }

    #[test]
    fn normalizes_a_full_volume() {
        let volume: Volume = serde_json::from_str(
            r#"{
                "id": "B1lTDwAAQBAJ",
                "volumeInfo": {
                    "title": "  Dune   ",
                    "authors": ["Frank  Herbert", "   "],
                    "publishedDate": "1965-08-01",
                    "publisher": "Chilton Books",
                    "description": "A  desert  planet.",
                    "pageCount": 412,
                    "categories": ["Fiction"],
                    "averageRating": 4.5,
                    "ratingsCount": 5000,
                    "language": "en",
                    "previewLink": "https://books.example/preview",
                    "infoLink": "https://books.example/info",
                    "imageLinks": {"thumbnail": "https://books.example/thumb.jpg"},
                    "industryIdentifiers": [
                        {"type": "ISBN_10", "identifier": "0441172717"},
                        {"type": "ISBN_13", "identifier": "9780441172719"},
                        {"type": "OTHER", "identifier": "OCLC:123"}
                    ]
                }
            }"#,
        )
        .unwrap();

        let candidate = ExternalCandidate::from_volume(volume);

        assert_eq!(candidate.title.as_deref(), Some("Dune"));
        assert_eq!(candidate.authors, vec!["Frank Herbert".to_owned()]);
        assert_eq!(
            candidate.published,
            Some(PartialDate::Full(
                NaiveDate::from_ymd_opt(1965, 8, 1).unwrap()
            ))
        );
        assert_eq!(candidate.description.as_deref(), Some("A desert planet."));
        assert_eq!(candidate.isbn10.as_deref(), Some("0441172717"));
        assert_eq!(candidate.isbn13.as_deref(), Some("9780441172719"));
        assert_eq!(candidate.volume_id.as_deref(), Some("B1lTDwAAQBAJ"));
        assert_eq!(
            candidate.thumbnail.as_deref(),
            Some("https://books.example/thumb.jpg")
        );
    }

    #[test]
    fn missing_fields_stay_absent() {
        let volume: Volume =
            serde_json::from_str(r#"{"volumeInfo": {"title": ""}}"#).unwrap();

        let candidate = ExternalCandidate::from_volume(volume);

        assert_eq!(candidate.title, None);
        assert!(candidate.authors.is_empty());
        assert_eq!(candidate.published, None);
        assert_eq!(candidate.isbn13, None);
        assert_eq!(candidate.volume_id, None);
    }
}
