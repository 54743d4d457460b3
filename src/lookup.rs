//! Anime lookup: catalog id or ranked title search plus selection prompt.

use anidl_core::{AnimeInfo, AnimeSummary, CatalogClient};
use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::picker::Picker;

/// Orders search hits by title similarity to `query`, best first. Equal
/// scores keep catalog order.
pub(crate) fn rank_by_similarity(query: &str, mut hits: Vec<AnimeSummary>) -> Vec<AnimeSummary> {
    let query = query.trim().to_lowercase();
    let score = |hit: &AnimeSummary| strsim::jaro_winkler(&query, &hit.title.to_lowercase());
    hits.sort_by(|a, b| score(b).total_cmp(&score(a)));
    hits
}

/// Finds the anime to work on, by id or by searching `query`.
pub(crate) async fn find_anime(
    catalog: &CatalogClient,
    picker: &dyn Picker,
    id: Option<&str>,
    query: Option<&str>,
) -> Result<AnimeInfo> {
    if let Some(id) = id {
        return catalog
            .anime_info(id)
            .await
            .with_context(|| format!("failed to look up anime id '{id}'"));
    }

    let query = match query {
        Some(q) => q.to_string(),
        None => match picker.ask("Search anime").await? {
            Some(q) => q,
            None => bail!("no anime given\n  Suggestion: pass --anime <NAME> or --id <ID>"),
        },
    };

    let hits = catalog
        .search(&query)
        .await
        .with_context(|| format!("catalog search for '{query}' failed"))?;
    if hits.is_empty() {
        bail!("no anime found for '{query}'");
    }
    let ranked = rank_by_similarity(&query, hits);
    debug!(results = ranked.len(), "search results ranked");

    let labels: Vec<String> = ranked.iter().map(AnimeSummary::label).collect();
    let Some(index) = picker.pick("Select anime", &labels).await? else {
        bail!("no anime selected from {} search results", ranked.len());
    };
    let Some(chosen) = ranked.into_iter().nth(index) else {
        bail!("selection {index} is out of range");
    };
    info!(id = %chosen.id, title = %chosen.title, "anime selected");
    Ok(AnimeInfo {
        id: chosen.id,
        title: chosen.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, title: &str) -> AnimeSummary {
        AnimeSummary {
            id: id.to_string(),
            title: title.to_string(),
            sub_episodes: None,
            dub_episodes: None,
        }
    }

    #[test]
    fn test_rank_puts_closest_title_first() {
        let ranked = rank_by_similarity(
            "one piece",
            vec![
                hit("a", "One Punch Man"),
                hit("b", "One Piece"),
                hit("c", "One Piece Film: Red"),
            ],
        );
        assert_eq!(ranked[0].id, "b");
    }

    #[test]
    fn test_rank_keeps_order_for_equal_scores() {
        let ranked = rank_by_similarity("x", vec![hit("1", "Same"), hit("2", "Same")]);
        assert_eq!(ranked[0].id, "1");
        assert_eq!(ranked[1].id, "2");
    }
}
