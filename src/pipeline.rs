use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::analysis::{self, CompetitionLevel, OpportunityTier, DEFAULT_SCORE};
use crate::db;
use crate::llm::LlmClient;
use crate::models::{
    BatchSummary, CategoryTrend, NewMetric, NewSession, PlatformSummary, Product, Recommendation,
    ResearchSession, WinningProduct, STATUS_COMPLETED, STATUS_FAILED,
};
use crate::webhook::{ResearchNotification, WebhookClient};

const TREND_SYSTEM: &str = "You assess e-commerce market trends. Judge whether the product is \
     rising, stable or declining given its category, seasonality and buyer behaviour, and answer \
     with a trend score from 1 to 10 where 10 is strongly trending.";

const DEMAND_SYSTEM: &str = "You assess e-commerce market demand. Weigh popularity signals, \
     category size and sales evidence, and answer with a demand score from 1 to 10 where 10 is \
     very high demand.";

const RECOMMENDATION_SYSTEM: &str = "You advise online sellers. Given a product and its analysis \
     scores, say whether it is Highly Recommended, Recommended, Caution or Avoid, list its key \
     strengths and weaknesses, and give concrete next steps. Be brief.";

#[derive(Debug, Clone)]
pub struct MarketReport {
    pub generated_at: DateTime<Utc>,
    pub top_opportunities: Vec<WinningProduct>,
    pub platform_performance: Vec<PlatformSummary>,
    pub trending_categories: Vec<CategoryTrend>,
}

impl MarketReport {
    pub fn best_platform(&self) -> Option<&str> {
        self.platform_performance.first().map(|p| p.platform.as_str())
    }

    pub fn top_category(&self) -> Option<&str> {
        self.trending_categories.first().map(|c| c.category.as_str())
    }
}

pub async fn collect_market_report(pool: &PgPool) -> anyhow::Result<MarketReport> {
    Ok(MarketReport {
        generated_at: Utc::now(),
        top_opportunities: db::winning_products(pool, Some(20)).await?,
        platform_performance: db::platform_summary(pool).await?,
        trending_categories: db::trending_categories(pool, 3, 15).await?,
    })
}

async fn ask(llm: &LlmClient, prompt: &str, system: &str) -> Option<String> {
    match llm.generate(prompt, system).await {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "model query failed, falling back to defaults");
            None
        }
    }
}

fn describe(product: &Product) -> String {
    format!(
        "Title: {}\nPlatform: {}\nCategory: {}\nPrice: {:.2} {}\nSales: {}\nReviews: {}",
        product.title,
        product.platform,
        product.category.as_deref().unwrap_or("N/A"),
        product.price.unwrap_or(0.0),
        product.currency.as_deref().unwrap_or("USD"),
        product.sales_count.unwrap_or(0),
        product.review_count.unwrap_or(0),
    )
}

/// Scores one product. Model failures degrade to default scores rather than failing.
pub async fn analyze_product(
    pool: &PgPool,
    llm: &LlmClient,
    product: &Product,
) -> anyhow::Result<NewMetric> {
    let competitors = db::count_similar_products(pool, product).await?;
    let competition = CompetitionLevel::from_competitor_count(competitors);

    let details = describe(product);

    let trend_score = ask(
        llm,
        &format!("Analyze this product for market trends:\n{details}\nGive a trend score (1-10)."),
        TREND_SYSTEM,
    )
    .await
    .map(|text| analysis::extract_numeric_score(&text, DEFAULT_SCORE))
    .unwrap_or(DEFAULT_SCORE);

    let profit = analysis::profit_potential(
        product.price.unwrap_or(0.0),
        product.sales_count,
        &product.platform,
    );

    let model_demand = ask(
        llm,
        &format!("Assess market demand for this product:\n{details}\nGive a demand score (1-10)."),
        DEMAND_SYSTEM,
    )
    .await
    .map(|text| analysis::extract_numeric_score(&text, DEFAULT_SCORE))
    .unwrap_or(DEFAULT_SCORE);
    let demand = analysis::adjust_demand(model_demand, product.sales_count, product.review_count);

    let recommendation = ask(
        llm,
        &format!(
            "{details}\n\nTrend score: {trend_score:.1}/10\nCompetition: {} ({competitors} similar listings)\n\
             Profit potential: {profit:.1}/10\nMarket demand: {demand:.1}/10\n\nGive your recommendation.",
            competition.as_str()
        ),
        RECOMMENDATION_SYSTEM,
    )
    .await;

    Ok(NewMetric {
        product_id: product.id,
        date_analyzed: None,
        trend_score: Some(trend_score),
        competition_level: Some(competition.as_str().to_string()),
        profit_potential: Some(profit),
        market_demand: Some(demand),
        keyword_difficulty: None,
        ai_recommendation: recommendation,
        opportunity_score: Some(analysis::opportunity_score(
            trend_score,
            profit,
            demand,
            competition,
        )),
    })
}

/// Scores up to `limit` products that lack a recent snapshot. Per-product failures are counted, not raised.
pub async fn batch_analyze(
    pool: &PgPool,
    llm: &LlmClient,
    limit: i64,
) -> anyhow::Result<BatchSummary> {
    let products = db::products_pending_analysis(pool, limit).await?;
    info!(count = products.len(), "products pending analysis");

    let mut summary = BatchSummary::default();
    for product in &products {
        let metric = match analyze_product(pool, llm, product).await {
            Ok(metric) => metric,
            Err(e) => {
                warn!(product_id = product.id, error = %e, "analysis failed");
                summary.failed += 1;
                continue;
            }
        };

        let recorded = match db::record_metric(pool, &metric).await {
            Ok(recorded) => recorded,
            Err(e) if e.is_constraint_violation() => {
                warn!(product_id = product.id, error = %e, "metric rejected");
                summary.failed += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let score = recorded.opportunity_score.unwrap_or(0.0);
        summary.total_analyzed += 1;
        match analysis::tier(score) {
            OpportunityTier::High => {
                summary.high_opportunity += 1;
                summary.recommendations.push(Recommendation {
                    product_id: product.id,
                    title: product.title.clone(),
                    platform: product.platform.clone(),
                    score,
                    recommendation: recorded.ai_recommendation.clone(),
                });
            }
            OpportunityTier::Medium => summary.medium_opportunity += 1,
            OpportunityTier::Low => summary.low_opportunity += 1,
        }
    }

    info!(
        analyzed = summary.total_analyzed,
        high = summary.high_opportunity,
        failed = summary.failed,
        "batch analysis finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub session_name: String,
    pub platforms: Vec<String>,
    pub keywords: Vec<String>,
    pub csv: Option<PathBuf>,
    pub analyze_limit: i64,
}

#[derive(Debug)]
pub struct ResearchOutcome {
    pub session: ResearchSession,
    pub batch: BatchSummary,
    pub notified: bool,
}

/// Runs one research session: ingest, analyze, close the session and notify the workflow engine.
pub async fn run_research(
    pool: &PgPool,
    llm: &LlmClient,
    webhook: Option<&WebhookClient>,
    request: &ResearchRequest,
) -> anyhow::Result<ResearchOutcome> {
    let session = db::create_session(
        pool,
        &NewSession {
            session_name: request.session_name.clone(),
            platforms: request.platforms.clone(),
            keywords_searched: request.keywords.clone(),
        },
    )
    .await?;

    let batch = match research_steps(pool, llm, session.id, request).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!(session_id = session.id, error = %e, "research run failed");
            db::finish_session(pool, session.id, STATUS_FAILED).await?;
            return Err(e);
        }
    };
    let session = db::finish_session(pool, session.id, STATUS_COMPLETED).await?;

    let notified = match webhook {
        Some(webhook) => {
            let report = collect_market_report(pool).await?;
            let notification = ResearchNotification::new(
                &session,
                &batch,
                report.best_platform().map(str::to_string),
                report.top_opportunities.into_iter().take(5).collect(),
            );
            webhook.send_research(&notification).await
        }
        None => false,
    };

    Ok(ResearchOutcome {
        session,
        batch,
        notified,
    })
}

async fn research_steps(
    pool: &PgPool,
    llm: &LlmClient,
    session_id: i32,
    request: &ResearchRequest,
) -> anyhow::Result<BatchSummary> {
    let products_found = match &request.csv {
        Some(path) => db::import_csv(pool, path).await?.inserted,
        None => 0,
    };
    let products_found = i32::try_from(products_found)?;
    db::update_session_progress(pool, session_id, products_found, 0).await?;

    let batch = batch_analyze(pool, llm, request.analyze_limit).await?;
    db::update_session_progress(
        pool,
        session_id,
        products_found,
        i32::try_from(batch.high_opportunity)?,
    )
    .await?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn product() -> Product {
        let at = Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap();
        Product {
            id: 7,
            title: "Wireless Mouse".to_string(),
            platform: "Etsy".to_string(),
            category: None,
            price: Some(24.5),
            currency: Some("USD".to_string()),
            sales_count: Some(120),
            rating: Some(4.7),
            review_count: None,
            seller_info: None,
            product_url: None,
            image_urls: Vec::new(),
            description: None,
            tags: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn describe_fills_missing_fields() {
        let text = describe(&product());
        assert!(text.contains("Title: Wireless Mouse"));
        assert!(text.contains("Category: N/A"));
        assert!(text.contains("Price: 24.50 USD"));
        assert!(text.contains("Sales: 120"));
        assert!(text.contains("Reviews: 0"));
    }

    #[test]
    fn report_headlines_use_first_rows() {
        let report = MarketReport {
            generated_at: Utc::now(),
            top_opportunities: Vec::new(),
            platform_performance: vec![PlatformSummary {
                platform: "Shopify".to_string(),
                total_products: 4,
                avg_price: Some(40.0),
                avg_opportunity_score: Some(7.2),
                winning_products_count: 2,
            }],
            trending_categories: Vec::new(),
        };
        assert_eq!(report.best_platform(), Some("Shopify"));
        assert_eq!(report.top_category(), None);
    }

    #[tokio::test]
    async fn unreachable_model_falls_back_to_none() {
        let llm = LlmClient::new("http://127.0.0.1:9", "llama3", std::time::Duration::from_secs(2))
            .unwrap();
        assert!(ask(&llm, "Rate this", TREND_SYSTEM).await.is_none());
    }
}
