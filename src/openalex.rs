//! OpenAlex API bindings
//!
//! Typed wire records for the two lookups the pipeline needs:
//! - `GET /works/doi:{doi}` or `GET /works/{id}` for paper metadata
//! - `GET /authors/{id}?select=counts_by_year` for yearly citation counts
//!
//! Wire records keep every field optional and are converted into the
//! [`crate::network`] model with explicit defaults (year 0, no
//! institutions, empty series).

use crate::client::RateLimitedClient;
use crate::error::Result;
use crate::network::{Authorship, PaperNode, YearCount};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

/// Fields requested for a work
const WORK_FIELDS: &str = "id,doi,publication_year,referenced_works,authorships";

fn doi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("valid DOI regex"))
}

fn url_prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|https?://openalex\.org/|doi:)")
            .expect("valid prefix regex")
    })
}

/// Strip DOI resolver, OpenAlex and `doi:` prefixes from an identifier.
///
/// `https://openalex.org/W123` → `W123`, `https://doi.org/10.1/x` → `10.1/x`.
/// Anything else is returned trimmed but otherwise verbatim.
pub fn normalize_id(raw: &str) -> String {
    url_prefix_pattern().replace(raw.trim(), "").into_owned()
}

/// Whether an identifier is DOI-shaped (`10.<registrant>/<suffix>`).
pub fn is_doi(id: &str) -> bool {
    doi_pattern().is_match(id)
}

/// Path of the work endpoint for an identifier, percent-encoded.
pub fn work_path(id: &str) -> String {
    if is_doi(id) {
        format!("/works/doi:{}", urlencoding::encode(id))
    } else {
        format!("/works/{}", urlencoding::encode(id))
    }
}

/// Path of the author endpoint for an identifier, percent-encoded.
pub fn author_path(author_id: &str) -> String {
    format!("/authors/{}", urlencoding::encode(author_id))
}

// === OpenAlex API Response Types ===

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    publication_year: Option<i32>,
    referenced_works: Option<Vec<String>>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
    institutions: Option<Vec<OpenAlexInstitution>>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexInstitution {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorCounts {
    counts_by_year: Option<Vec<YearCount>>,
}

impl OpenAlexWork {
    fn into_paper(self, id: &str) -> PaperNode {
        let references = self
            .referenced_works
            .unwrap_or_default()
            .iter()
            .map(|r| normalize_id(r))
            .filter(|r| !r.is_empty())
            .collect();

        // Authorships without an author id carry nothing we can key on
        let authorships = self
            .authorships
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let author = a.author?;
                let author_id = normalize_id(author.id.as_deref()?);
                if author_id.is_empty() {
                    return None;
                }
                let institutions = a
                    .institutions
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|i| i.id)
                    .map(|i| normalize_id(&i))
                    .filter(|i| !i.is_empty())
                    .collect();
                Some(Authorship {
                    author_id,
                    display_name: author.display_name.unwrap_or_default(),
                    institutions,
                })
            })
            .collect();

        PaperNode {
            id: id.to_string(),
            publication_year: self.publication_year.unwrap_or(0),
            references,
            authorships,
        }
    }
}

/// Fetch metadata for one work.
///
/// Returns `Ok(None)` when the API does not know the identifier.
pub async fn fetch_work(client: &RateLimitedClient, id: &str) -> Result<Option<PaperNode>> {
    let url = client.endpoint_url(&work_path(id), &[("select", WORK_FIELDS)])?;
    debug!(id = id, "Fetching work");

    let work: Option<OpenAlexWork> = client.fetch_json(&url).await?;
    Ok(work.map(|w| w.into_paper(id)))
}

/// Fetch an author's yearly citation series, in the order the API returns it.
///
/// An unknown author yields an empty series.
pub async fn fetch_author_counts(
    client: &RateLimitedClient,
    author_id: &str,
) -> Result<Vec<YearCount>> {
    let url = client.endpoint_url(&author_path(author_id), &[("select", "counts_by_year")])?;
    debug!(author = author_id, "Fetching author citation counts");

    let record: Option<OpenAlexAuthorCounts> = client.fetch_json(&url).await?;
    Ok(record.and_then(|r| r.counts_by_year).unwrap_or_default())
}
