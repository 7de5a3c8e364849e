use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{Result, StoreError};

pub const DEFAULT_CURRENCY: &str = "USD";

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: i32,
    pub title: String,
    pub platform: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub sales_count: Option<i32>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub seller_info: Option<String>,
    pub product_url: Option<String>,
    pub image_urls: Vec<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product attributes supplied by ingestion; id and timestamps are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub title: String,
    pub platform: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub sales_count: Option<i32>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub seller_info: Option<String>,
    pub product_url: Option<String>,
    pub image_urls: Vec<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl NewProduct {
    pub fn new(title: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            platform: platform.into(),
            currency: Some(DEFAULT_CURRENCY.to_string()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("platform", &self.platform)?;
        finite("price", self.price)?;
        finite("rating", self.rating)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductMetric {
    pub id: i32,
    pub product_id: i32,
    pub date_analyzed: NaiveDate,
    pub trend_score: Option<f64>,
    pub competition_level: Option<String>,
    pub profit_potential: Option<f64>,
    pub market_demand: Option<f64>,
    pub keyword_difficulty: Option<f64>,
    pub ai_recommendation: Option<String>,
    pub opportunity_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMetric {
    pub product_id: i32,
    /// Defaults to the current date when absent.
    pub date_analyzed: Option<NaiveDate>,
    pub trend_score: Option<f64>,
    pub competition_level: Option<String>,
    pub profit_potential: Option<f64>,
    pub market_demand: Option<f64>,
    pub keyword_difficulty: Option<f64>,
    pub ai_recommendation: Option<String>,
    pub opportunity_score: Option<f64>,
}

impl NewMetric {
    pub fn validate(&self) -> Result<()> {
        finite("trend_score", self.trend_score)?;
        finite("profit_potential", self.profit_potential)?;
        finite("market_demand", self.market_demand)?;
        finite("keyword_difficulty", self.keyword_difficulty)?;
        finite("opportunity_score", self.opportunity_score)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Keyword {
    pub id: i32,
    pub keyword: String,
    pub platform: Option<String>,
    pub search_volume: Option<i32>,
    pub competition_score: Option<f64>,
    pub trend_direction: Option<String>,
    pub related_products: Vec<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewKeyword {
    pub keyword: String,
    pub platform: Option<String>,
    pub search_volume: Option<i32>,
    pub competition_score: Option<f64>,
    pub trend_direction: Option<String>,
    /// Product ids; not checked against `products`.
    pub related_products: Vec<i32>,
}

impl NewKeyword {
    pub fn validate(&self) -> Result<()> {
        require_text("keyword", &self.keyword)?;
        finite("competition_score", self.competition_score)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResearchSession {
    pub id: i32,
    pub session_name: String,
    pub platforms: Vec<String>,
    pub keywords_searched: Vec<String>,
    pub products_found: i32,
    pub opportunities_identified: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub session_name: String,
    pub platforms: Vec<String>,
    pub keywords_searched: Vec<String>,
}

impl NewSession {
    pub fn validate(&self) -> Result<()> {
        require_text("session_name", &self.session_name)
    }
}

/// One row of the `winning_products` view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WinningProduct {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub opportunity_score: f64,
    pub trend_score: Option<f64>,
    pub profit_potential: Option<f64>,
    pub ai_recommendation: Option<String>,
}

/// One row of the `platform_summary` view.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PlatformSummary {
    pub platform: String,
    pub total_products: i64,
    pub avg_price: Option<f64>,
    pub avg_opportunity_score: Option<f64>,
    pub winning_products_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryTrend {
    pub category: String,
    pub product_count: i64,
    pub avg_trend_score: Option<f64>,
    pub avg_opportunity_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub product_id: i32,
    pub title: String,
    pub platform: String,
    pub score: f64,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total_analyzed: usize,
    pub high_opportunity: usize,
    pub medium_opportunity: usize,
    pub low_opportunity: usize,
    pub failed: usize,
    pub recommendations: Vec<Recommendation>,
}

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::MissingField(field));
    }
    Ok(())
}

fn finite(field: &'static str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() => Err(StoreError::InvalidValue {
            field,
            reason: format!("{v} is not a finite number"),
        }),
        _ => Ok(()),
    }
}
