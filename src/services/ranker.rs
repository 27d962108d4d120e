use std::collections::HashSet;

use crate::{
    models::{CandidateResult, Category, ItemKey},
    services::affinity::TrainedModel,
};

/// Default number of results per request
pub const DEFAULT_LIMIT: usize = 10;

/// Ranks every indexed item of `category` for `user`
///
/// Excluded items never reach scoring. Ties keep index order because the sort
/// is stable, which makes output reproducible for a fixed model.
pub fn rank_candidates(
    model: &TrainedModel,
    user: &str,
    category: Category,
    exclude: &HashSet<ItemKey>,
    limit: usize,
) -> Vec<CandidateResult> {
    if limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<CandidateResult> = model
        .index()
        .items()
        .iter()
        .filter(|key| key.category == category && !exclude.contains(*key))
        .map(|key| CandidateResult {
            category: key.category,
            item_id: key.item_id.clone(),
            score: model.predict(user, key),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);

    tracing::debug!(
        user = %user,
        category = %category,
        excluded = exclude.len(),
        returned = scored.len(),
        model_type = %model.model_type(),
        "Ranked candidates"
    );

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::ModelType,
        services::{
            affinity::{test_support::*, TrainingConfig, FALLBACK_SCORE},
            aggregator::DatasetBuilder,
        },
    };

    fn model(model_type: ModelType) -> TrainedModel {
        TrainedModel::train(model_type, &shared_taste_dataset(), &TrainingConfig::default()).unwrap()
    }

    fn ids(results: &[CandidateResult]) -> Vec<&str> {
        results.iter().map(|r| r.item_id.as_str()).collect()
    }

    #[test]
    fn test_excluded_item_never_returned() {
        for model_type in ModelType::ALL {
            let model = model(model_type);
            let exclude: HashSet<ItemKey> = [movie("1")].into_iter().collect();

            let results = rank_candidates(&model, "A", Category::Movie, &exclude, 2);

            assert_eq!(ids(&results), vec!["2", "3"], "{model_type}");
        }
    }

    #[test]
    fn test_excluding_everything_yields_empty() {
        let model = model(ModelType::LatentFactor);
        let exclude: HashSet<ItemKey> = model.index().items().iter().cloned().collect();
        assert!(rank_candidates(&model, "B", Category::Movie, &exclude, 10).is_empty());
    }

    #[test]
    fn test_category_filter() {
        let model = model(ModelType::EmbeddingRanker);
        assert!(rank_candidates(&model, "A", Category::Show, &HashSet::new(), 10).is_empty());
    }

    #[test]
    fn test_limit_truncates_and_zero_limit_is_empty() {
        let model = model(ModelType::LatentFactor);
        assert_eq!(rank_candidates(&model, "A", Category::Movie, &HashSet::new(), 1).len(), 1);
        assert!(rank_candidates(&model, "A", Category::Movie, &HashSet::new(), 0).is_empty());
    }

    #[test]
    fn test_scores_sorted_descending() {
        let model = model(ModelType::EmbeddingRanker);
        let results = rank_candidates(&model, "B", Category::Movie, &HashSet::new(), 10);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_cold_start_keeps_index_order() {
        let model = model(ModelType::LatentFactor);
        let results = rank_candidates(&model, "stranger", Category::Movie, &HashSet::new(), 10);

        assert_eq!(ids(&results), vec!["1", "2", "3"]);
        assert!(results.iter().all(|r| r.score == FALLBACK_SCORE));
    }

    #[test]
    fn test_ranking_is_repeatable() {
        let model = model(ModelType::EmbeddingRanker);
        let first = rank_candidates(&model, "A", Category::Movie, &HashSet::new(), 5);
        let second = rank_candidates(&model, "A", Category::Movie, &HashSet::new(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_model_returns_catalog_items_at_fallback() {
        let mut builder = DatasetBuilder::new();
        builder.register_item(&movie("9"));
        let model =
            TrainedModel::train(ModelType::LatentFactor, &builder.build(), &TrainingConfig::default())
                .unwrap();

        let results = rank_candidates(&model, "A", Category::Movie, &HashSet::new(), 10);
        assert_eq!(ids(&results), vec!["9"]);
        assert_eq!(results[0].score, FALLBACK_SCORE);
    }
}
