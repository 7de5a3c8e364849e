use std::sync::LazyLock;

use regex::Regex;

pub const WINNING_THRESHOLD: f64 = 7.0;
pub const HIGH_OPPORTUNITY_THRESHOLD: f64 = 7.5;
pub const MEDIUM_OPPORTUNITY_THRESHOLD: f64 = 5.5;
pub const ALERT_THRESHOLD: f64 = 8.0;
pub const DEFAULT_SCORE: f64 = 5.0;

const TREND_WEIGHT: f64 = 0.25;
const PROFIT_WEIGHT: f64 = 0.30;
const DEMAND_WEIGHT: f64 = 0.30;
const COMPETITION_WEIGHT: f64 = 0.15;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "new",
    "used",
];

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"score[:\s]+(\d+(?:\.\d+)?)",
        r"(\d+(?:\.\d+)?)[/\s]*(?:out of |/)?\s*10",
        r"rating[:\s]+(\d+(?:\.\d+)?)",
        r"(\d+(?:\.\d+)?)[/\s]*10",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("score pattern is valid"))
    .collect()
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{3,}\b").expect("word pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
    VeryHigh,
    Unknown,
}

impl CompetitionLevel {
    pub fn from_competitor_count(count: i64) -> Self {
        match count {
            c if c < 10 => CompetitionLevel::Low,
            c if c < 50 => CompetitionLevel::Medium,
            c if c < 200 => CompetitionLevel::High,
            _ => CompetitionLevel::VeryHigh,
        }
    }

    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => CompetitionLevel::Low,
            "medium" => CompetitionLevel::Medium,
            "high" => CompetitionLevel::High,
            "very high" => CompetitionLevel::VeryHigh,
            _ => CompetitionLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionLevel::Low => "Low",
            CompetitionLevel::Medium => "Medium",
            CompetitionLevel::High => "High",
            CompetitionLevel::VeryHigh => "Very High",
            CompetitionLevel::Unknown => "Unknown",
        }
    }

    /// Lower competition scores higher.
    pub fn score(&self) -> f64 {
        match self {
            CompetitionLevel::Low => 9.0,
            CompetitionLevel::Medium => 6.0,
            CompetitionLevel::High => 4.0,
            CompetitionLevel::VeryHigh => 2.0,
            CompetitionLevel::Unknown => 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityTier {
    High,
    Medium,
    Low,
}

pub fn tier(opportunity_score: f64) -> OpportunityTier {
    if opportunity_score >= HIGH_OPPORTUNITY_THRESHOLD {
        OpportunityTier::High
    } else if opportunity_score >= MEDIUM_OPPORTUNITY_THRESHOLD {
        OpportunityTier::Medium
    } else {
        OpportunityTier::Low
    }
}

/// Estimated share of the sale price kept after platform fees.
pub fn platform_margin(platform: &str) -> f64 {
    match platform.to_ascii_lowercase().as_str() {
        "ebay" => 0.25,
        "amazon" => 0.15,
        "etsy" => 0.35,
        "shopify" => 0.45,
        _ => 0.25,
    }
}

pub fn profit_potential(price: f64, sales_count: Option<i32>, platform: &str) -> f64 {
    let estimated_profit = price * platform_margin(platform);
    let base = if estimated_profit > 50.0 {
        9.0
    } else if estimated_profit > 25.0 {
        7.0
    } else if estimated_profit > 10.0 {
        5.0
    } else if estimated_profit > 5.0 {
        3.0
    } else {
        2.0
    };

    match sales_count.unwrap_or(0) {
        s if s > 100 => f64::min(10.0, base + 1.5),
        s if s > 50 => f64::min(10.0, base + 1.0),
        _ => base,
    }
}

/// Nudges a model-estimated demand score with observed sales and review volume.
pub fn adjust_demand(model_score: f64, sales_count: Option<i32>, review_count: Option<i32>) -> f64 {
    let mut score = model_score;
    match sales_count.unwrap_or(0) {
        s if s > 1000 => score = f64::min(10.0, score + 1.5),
        s if s > 100 => score = f64::min(10.0, score + 1.0),
        _ => {}
    }
    if review_count.unwrap_or(0) > 500 {
        score = f64::min(10.0, score + 1.0);
    }
    clamp_score(score)
}

pub fn opportunity_score(
    trend_score: f64,
    profit_potential: f64,
    market_demand: f64,
    competition: CompetitionLevel,
) -> f64 {
    let raw = trend_score * TREND_WEIGHT
        + profit_potential * PROFIT_WEIGHT
        + market_demand * DEMAND_WEIGHT
        + competition.score() * COMPETITION_WEIGHT;
    (raw * 100.0).round() / 100.0
}

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(1.0, 10.0)
}

/// Pulls a 1-10 score out of free text such as "score: 7", "8/10" or "rating of 6 out of 10".
pub fn extract_numeric_score(text: &str, default: f64) -> f64 {
    let lowered = text.to_lowercase();
    SCORE_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(&lowered))
        .find_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .map(clamp_score)
        .unwrap_or(default)
}

/// Up to five significant words from a product title, in title order.
pub fn extract_key_terms(title: &str) -> Vec<String> {
    let lowered = title.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| !STOP_WORDS.contains(word))
        .take(5)
        .map(str::to_string)
        .collect()
}

/// LIKE pattern matching titles that contain every term in order.
pub fn similarity_pattern(terms: &[String]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(format!("%{}%", terms.join("%")))
}
