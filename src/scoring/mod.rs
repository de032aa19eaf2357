//! Score aggregation
//!
//! Combines per-category engine scores into one 0-100 score using the
//! default weight table, or the fund's own hints when they name at least
//! one known category.

use crate::models::{Category, EngineResult};
use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Score used when no category produced a usable number.
pub const NEUTRAL_SCORE: f64 = 50.0;

lazy_static! {
    /// Normalized hint name → category
    static ref CATEGORY_SYNONYMS: HashMap<&'static str, Category> = {
        let table: &[(Category, &[&str])] = &[
            (
                Category::StrategicFit,
                &[
                    "strategic fit", "strategy", "strategic alignment", "thesis fit",
                    "fund fit", "investment thesis", "mandate fit",
                ],
            ),
            (
                Category::Market,
                &[
                    "market", "market opportunity", "market attractiveness", "market size",
                    "tam", "market dynamics", "competitive landscape",
                ],
            ),
            (
                Category::Product,
                &[
                    "product", "product quality", "technology", "product technology",
                    "innovation", "product market fit", "moat",
                ],
            ),
            (
                Category::Financial,
                &[
                    "financial", "financials", "financial health", "unit economics",
                    "traction", "revenue", "valuation",
                ],
            ),
            (
                Category::Team,
                &[
                    "team", "team quality", "founders", "founding team", "leadership",
                    "management", "execution",
                ],
            ),
        ];

        let mut map = HashMap::new();
        for (category, names) in table {
            for name in names.iter() {
                map.insert(*name, *category);
            }
        }
        map
    };
}

/// Stem checked when no exact synonym matches
fn stem(category: Category) -> &'static str {
    match category {
        Category::StrategicFit => "strateg",
        Category::Market => "market",
        Category::Product => "product",
        Category::Financial => "financ",
        Category::Team => "team",
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match a free-form weight hint to a category.
pub fn match_category(hint: &str) -> Option<Category> {
    let normalized = normalize(hint);
    if normalized.is_empty() {
        return None;
    }

    if let Some(category) = CATEGORY_SYNONYMS.get(normalized.as_str()) {
        return Some(*category);
    }

    let mut candidates = Category::ALL
        .iter()
        .copied()
        .filter(|c| normalized.split(' ').any(|word| word.starts_with(stem(*c))));

    // Ambiguous hints ("market product fit") match nothing
    match (candidates.next(), candidates.next()) {
        (Some(category), None) => Some(category),
        _ => None,
    }
}

/// Resolved weights; every category present, summing to 1 unless all zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: BTreeMap<Category, f64>,
    pub from_fund: bool,
}

impl WeightTable {
    pub fn defaults() -> Self {
        Self {
            weights: Category::ALL
                .iter()
                .map(|c| (*c, c.default_weight()))
                .collect(),
            from_fund: false,
        }
    }

    /// Build from fund hints (0-100). A matched hint replaces that category's
    /// default; unnamed categories keep theirs, on the same 0-100 scale. The
    /// table is then normalized. Falls back to defaults if no hint matches or
    /// every weight ends up zero.
    pub fn from_hints(hints: &BTreeMap<String, f64>) -> Self {
        let mut named: BTreeMap<Category, f64> = BTreeMap::new();

        for (name, weight) in hints {
            if !weight.is_finite() || *weight < 0.0 {
                continue;
            }
            match match_category(name) {
                Some(category) => *named.entry(category).or_insert(0.0) += weight.min(100.0),
                None => debug!(hint = %name, "Weight hint matches no category"),
            }
        }

        if named.is_empty() {
            return Self::defaults();
        }

        let raw: BTreeMap<Category, f64> = Category::ALL
            .iter()
            .map(|c| {
                let weight = named
                    .get(c)
                    .copied()
                    .unwrap_or_else(|| c.default_weight() * 100.0);
                (*c, weight)
            })
            .collect();

        let total: f64 = raw.values().sum();
        if total <= 0.0 {
            return Self::defaults();
        }

        Self {
            weights: raw.into_iter().map(|(c, w)| (c, w / total)).collect(),
            from_fund: true,
        }
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.0)
    }
}

/// Weighted score aggregation
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Overall 0-100 score from whatever categories have a score.
    pub fn aggregate(
        &self,
        results: &BTreeMap<Category, EngineResult>,
        hints: &BTreeMap<String, f64>,
    ) -> u8 {
        let scores: BTreeMap<Category, f64> = results
            .iter()
            .map(|(category, result)| (*category, result.score))
            .collect();
        self.aggregate_scores(&scores, hints)
    }

    /// Same as [`ScoreAggregator::aggregate`] over bare scores.
    pub fn aggregate_scores(
        &self,
        scores: &BTreeMap<Category, f64>,
        hints: &BTreeMap<String, f64>,
    ) -> u8 {
        let table = WeightTable::from_hints(hints);

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for (category, score) in scores {
            if !score.is_finite() {
                continue;
            }
            let weight = table.weight(*category);
            weighted_sum += score.clamp(0.0, 100.0) * weight;
            weight_total += weight;
        }

        let overall = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            NEUTRAL_SCORE
        };

        debug!(
            overall,
            categories = scores.len(),
            fund_weights = table.from_fund,
            "Aggregated score"
        );

        overall.round().clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::gateway::fallback_result;
    use crate::models::ValidationStatus;

    fn results(scores: &[(Category, f64)]) -> BTreeMap<Category, EngineResult> {
        scores
            .iter()
            .map(|(category, score)| {
                (
                    *category,
                    EngineResult {
                        engine: category.as_str().to_string(),
                        score: *score,
                        analysis: String::new(),
                        confidence: 80.0,
                        sources: vec![],
                        validation_status: ValidationStatus::Validated,
                    },
                )
            })
            .collect()
    }

    fn hints(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_synonym_matching() {
        assert_eq!(match_category("Market Opportunity"), Some(Category::Market));
        assert_eq!(match_category("market attractiveness"), Some(Category::Market));
        assert_eq!(match_category("Team_Quality"), Some(Category::Team));
        assert_eq!(match_category("Founders"), Some(Category::Team));
        assert_eq!(match_category("Strategic-Fit"), Some(Category::StrategicFit));
        assert_eq!(match_category("Financial Performance"), Some(Category::Financial));
        assert_eq!(match_category("market product fit"), None);
        assert_eq!(match_category("ESG"), None);
        assert_eq!(match_category("  "), None);
    }

    #[test]
    fn test_default_weights() {
        let r = results(&[
            (Category::StrategicFit, 90.0),
            (Category::Market, 85.0),
            (Category::Product, 80.0),
            (Category::Financial, 75.0),
            (Category::Team, 95.0),
        ]);
        // 22.5 + 17 + 16 + 15 + 14.25 = 84.75
        assert_eq!(ScoreAggregator::new().aggregate(&r, &BTreeMap::new()), 85);
    }

    fn skewed_results() -> BTreeMap<Category, EngineResult> {
        results(&[
            (Category::StrategicFit, 20.0),
            (Category::Market, 100.0),
            (Category::Product, 20.0),
            (Category::Financial, 20.0),
            (Category::Team, 60.0),
        ])
    }

    #[test]
    fn test_fund_naming_every_category_replaces_table() {
        let h = hints(&[
            ("Strategic Fit", 0.0),
            ("Market Opportunity", 75.0),
            ("Product", 0.0),
            ("Financials", 0.0),
            ("Team Quality", 25.0),
        ]);

        // 100 * 0.75 + 60 * 0.25
        assert_eq!(ScoreAggregator::new().aggregate(&skewed_results(), &h), 90);

        let table = WeightTable::from_hints(&h);
        assert!(table.from_fund);
        assert_eq!(table.weight(Category::Product), 0.0);
    }

    #[test]
    fn test_partial_hints_keep_defaults_for_unnamed() {
        let h = hints(&[("Market Opportunity", 75.0), ("Team Quality", 25.0)]);
        let table = WeightTable::from_hints(&h);

        // 25 + 75 + 20 + 20 + 25 = 165
        assert!(table.from_fund);
        assert!((table.weight(Category::Market) - 75.0 / 165.0).abs() < 1e-9);
        assert!((table.weight(Category::Product) - 20.0 / 165.0).abs() < 1e-9);
        assert!((table.weight(Category::StrategicFit) - 25.0 / 165.0).abs() < 1e-9);

        // (500 + 7500 + 400 + 400 + 1500) / 165 = 62.42
        assert_eq!(ScoreAggregator::new().aggregate(&skewed_results(), &h), 62);
    }

    #[test]
    fn test_unusable_hints_fall_back_to_defaults() {
        assert_eq!(WeightTable::from_hints(&hints(&[("ESG", 50.0)])), WeightTable::defaults());
        assert_eq!(
            WeightTable::from_hints(&hints(&[("Market", f64::NAN), ("Team", -5.0)])),
            WeightTable::defaults()
        );

        let all_zero: Vec<(&str, f64)> = Category::ALL.iter().map(|c| (c.as_str(), 0.0)).collect();
        assert_eq!(WeightTable::from_hints(&hints(&all_zero)), WeightTable::defaults());
    }

    #[test]
    fn test_missing_category_excluded_not_zeroed() {
        let r = results(&[(Category::Market, 80.0), (Category::Team, 60.0)]);
        // (80 * 0.20 + 60 * 0.15) / 0.35 = 71.43
        assert_eq!(ScoreAggregator::new().aggregate(&r, &BTreeMap::new()), 71);
    }

    #[test]
    fn test_no_scores_is_neutral() {
        let aggregator = ScoreAggregator::new();
        assert_eq!(aggregator.aggregate(&BTreeMap::new(), &BTreeMap::new()), 50);

        // The only scored category is weighted out by the fund
        let r = results(&[(Category::Team, 90.0)]);
        assert_eq!(
            aggregator.aggregate(&r, &hints(&[("market", 100.0), ("team", 0.0)])),
            50
        );
    }

    #[test]
    fn test_all_fallbacks_score_fifty() {
        let r: BTreeMap<Category, EngineResult> = Category::ALL
            .iter()
            .map(|c| (*c, fallback_result(*c, "down")))
            .collect();
        assert_eq!(ScoreAggregator::new().aggregate(&r, &BTreeMap::new()), 50);
    }
}
