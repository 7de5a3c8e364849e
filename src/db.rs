use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use crate::analysis;
use crate::error::{Result, StoreError};
use crate::models::{
    CategoryTrend, Keyword, NewKeyword, NewMetric, NewProduct, NewSession, PlatformSummary,
    Product, ProductMetric, ResearchSession, WinningProduct, STATUS_ACTIVE,
};

const PRODUCT_COLUMNS: &str = "id, title, platform, category, price, currency, sales_count, \
     rating, review_count, seller_info, product_url, COALESCE(image_urls, '{}') AS image_urls, \
     description, COALESCE(tags, '{}') AS tags, created_at, updated_at";

const METRIC_COLUMNS: &str = "id, product_id, date_analyzed, trend_score, competition_level, \
     profit_potential, market_demand, keyword_difficulty, ai_recommendation, opportunity_score, \
     created_at";

const KEYWORD_COLUMNS: &str = "id, keyword, platform, search_volume, competition_score, \
     trend_direction, COALESCE(related_products, '{}') AS related_products, created_at";

const SESSION_COLUMNS: &str = "id, session_name, COALESCE(platforms, '{}') AS platforms, \
     COALESCE(keywords_searched, '{}') AS keywords_searched, products_found, \
     opportunities_identified, status, created_at, completed_at";

const WINNING_EXTRA_COLUMNS: &str = "opportunity_score, trend_score, profit_potential, ai_recommendation";

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a product, or updates product `id` when given. Duplicate (title, platform) pairs are allowed.
pub async fn upsert_product(
    pool: &PgPool,
    id: Option<i32>,
    product: &NewProduct,
) -> Result<Product> {
    product.validate()?;

    let Some(id) = id else {
        let query = format!(
            "INSERT INTO products \
             (title, platform, category, price, currency, sales_count, rating, review_count, \
              seller_info, product_url, image_urls, description, tags) \
             VALUES ($1, $2, $3, $4, COALESCE($5, 'USD'), $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let inserted = bind_product(sqlx::query_as::<_, Product>(&query), product)
            .fetch_one(pool)
            .await?;
        debug!(id = inserted.id, platform = %inserted.platform, "inserted product");
        return Ok(inserted);
    };

    let query = format!(
        "UPDATE products SET \
         title = $1, platform = $2, category = $3, price = $4, currency = COALESCE($5, 'USD'), \
         sales_count = $6, rating = $7, review_count = $8, seller_info = $9, product_url = $10, \
         image_urls = $11, description = $12, tags = $13, updated_at = NOW() \
         WHERE id = $14 \
         RETURNING {PRODUCT_COLUMNS}"
    );
    bind_product(sqlx::query_as::<_, Product>(&query), product)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "product", id })
}

fn bind_product<'q>(
    query: sqlx::query::QueryAs<'q, Postgres, Product, sqlx::postgres::PgArguments>,
    product: &'q NewProduct,
) -> sqlx::query::QueryAs<'q, Postgres, Product, sqlx::postgres::PgArguments> {
    query
        .bind(&product.title)
        .bind(&product.platform)
        .bind(&product.category)
        .bind(product.price)
        .bind(&product.currency)
        .bind(product.sales_count)
        .bind(product.rating)
        .bind(product.review_count)
        .bind(&product.seller_info)
        .bind(&product.product_url)
        .bind(&product.image_urls)
        .bind(&product.description)
        .bind(&product.tags)
}

pub async fn get_product(pool: &PgPool, id: i32) -> Result<Option<Product>> {
    let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    Ok(sqlx::query_as::<_, Product>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Appends a metric snapshot. Fails with a foreign-key violation when the product does not exist.
pub async fn record_metric(pool: &PgPool, metric: &NewMetric) -> Result<ProductMetric> {
    metric.validate()?;

    let query = format!(
        "INSERT INTO product_metrics \
         (product_id, date_analyzed, trend_score, competition_level, profit_potential, \
          market_demand, keyword_difficulty, ai_recommendation, opportunity_score) \
         VALUES ($1, COALESCE($2, CURRENT_DATE), $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {METRIC_COLUMNS}"
    );
    let recorded = sqlx::query_as::<_, ProductMetric>(&query)
        .bind(metric.product_id)
        .bind(metric.date_analyzed)
        .bind(metric.trend_score)
        .bind(&metric.competition_level)
        .bind(metric.profit_potential)
        .bind(metric.market_demand)
        .bind(metric.keyword_difficulty)
        .bind(&metric.ai_recommendation)
        .bind(metric.opportunity_score)
        .fetch_one(pool)
        .await?;

    debug!(
        product_id = recorded.product_id,
        opportunity_score = ?recorded.opportunity_score,
        "recorded metric snapshot"
    );
    Ok(recorded)
}

pub async fn metrics_for_product(pool: &PgPool, product_id: i32) -> Result<Vec<ProductMetric>> {
    let query = format!(
        "SELECT {METRIC_COLUMNS} FROM product_metrics \
         WHERE product_id = $1 ORDER BY created_at, id"
    );
    Ok(sqlx::query_as::<_, ProductMetric>(&query)
        .bind(product_id)
        .fetch_all(pool)
        .await?)
}

pub async fn upsert_keyword(
    pool: &PgPool,
    id: Option<i32>,
    keyword: &NewKeyword,
) -> Result<Keyword> {
    keyword.validate()?;

    let query = match id {
        None => format!(
            "INSERT INTO keywords \
             (keyword, platform, search_volume, competition_score, trend_direction, related_products) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {KEYWORD_COLUMNS}"
        ),
        Some(_) => format!(
            "UPDATE keywords SET \
             keyword = $1, platform = $2, search_volume = $3, competition_score = $4, \
             trend_direction = $5, related_products = $6 \
             WHERE id = $7 \
             RETURNING {KEYWORD_COLUMNS}"
        ),
    };

    let mut statement = sqlx::query_as::<_, Keyword>(&query)
        .bind(&keyword.keyword)
        .bind(&keyword.platform)
        .bind(keyword.search_volume)
        .bind(keyword.competition_score)
        .bind(&keyword.trend_direction)
        .bind(&keyword.related_products);
    if let Some(id) = id {
        statement = statement.bind(id);
    }

    statement
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "keyword",
            id: id.unwrap_or_default(),
        })
}

pub async fn keywords_for_platform(pool: &PgPool, platform: &str) -> Result<Vec<Keyword>> {
    let query = format!(
        "SELECT {KEYWORD_COLUMNS} FROM keywords WHERE platform = $1 \
         ORDER BY search_volume DESC NULLS LAST, id"
    );
    Ok(sqlx::query_as::<_, Keyword>(&query)
        .bind(platform)
        .fetch_all(pool)
        .await?)
}

pub async fn create_session(pool: &PgPool, session: &NewSession) -> Result<ResearchSession> {
    session.validate()?;

    let query = format!(
        "INSERT INTO research_sessions (session_name, platforms, keywords_searched, status) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {SESSION_COLUMNS}"
    );
    let created = sqlx::query_as::<_, ResearchSession>(&query)
        .bind(&session.session_name)
        .bind(&session.platforms)
        .bind(&session.keywords_searched)
        .bind(STATUS_ACTIVE)
        .fetch_one(pool)
        .await?;

    info!(id = created.id, name = %created.session_name, "research session started");
    Ok(created)
}

pub async fn update_session_progress(
    pool: &PgPool,
    id: i32,
    products_found: i32,
    opportunities_identified: i32,
) -> Result<ResearchSession> {
    for (field, value) in [
        ("products_found", products_found),
        ("opportunities_identified", opportunities_identified),
    ] {
        if value < 0 {
            return Err(StoreError::InvalidValue {
                field,
                reason: format!("{value} is negative"),
            });
        }
    }

    let query = format!(
        "UPDATE research_sessions \
         SET products_found = $1, opportunities_identified = $2 \
         WHERE id = $3 \
         RETURNING {SESSION_COLUMNS}"
    );
    sqlx::query_as::<_, ResearchSession>(&query)
        .bind(products_found)
        .bind(opportunities_identified)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "research session", id })
}

/// Sets the final status and stamps `completed_at`. Any status string is accepted.
pub async fn finish_session(pool: &PgPool, id: i32, status: &str) -> Result<ResearchSession> {
    if status.trim().is_empty() {
        return Err(StoreError::MissingField("status"));
    }

    let query = format!(
        "UPDATE research_sessions \
         SET status = $1, completed_at = NOW() \
         WHERE id = $2 \
         RETURNING {SESSION_COLUMNS}"
    );
    let finished = sqlx::query_as::<_, ResearchSession>(&query)
        .bind(status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "research session", id })?;

    info!(id, status = %finished.status, "research session finished");
    Ok(finished)
}

pub async fn get_session(pool: &PgPool, id: i32) -> Result<Option<ResearchSession>> {
    let query = format!("SELECT {SESSION_COLUMNS} FROM research_sessions WHERE id = $1");
    Ok(sqlx::query_as::<_, ResearchSession>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Rows of `winning_products`, highest score first. `None` returns every row.
pub async fn winning_products(pool: &PgPool, limit: Option<i64>) -> Result<Vec<WinningProduct>> {
    let query = format!(
        "SELECT {PRODUCT_COLUMNS}, {WINNING_EXTRA_COLUMNS} FROM winning_products \
         ORDER BY opportunity_score DESC, id, trend_score DESC NULLS LAST, \
         profit_potential DESC NULLS LAST \
         LIMIT $1"
    );
    Ok(sqlx::query_as::<_, WinningProduct>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

pub async fn platform_summary(pool: &PgPool) -> Result<Vec<PlatformSummary>> {
    Ok(sqlx::query_as::<_, PlatformSummary>(
        r#"
        SELECT platform, total_products, avg_price, avg_opportunity_score, winning_products_count
        FROM platform_summary
        ORDER BY avg_opportunity_score DESC NULLS LAST, platform
        "#,
    )
    .fetch_all(pool)
    .await?)
}

/// Products never scored, or not scored within the last seven days, newest first.
pub async fn products_pending_analysis(pool: &PgPool, limit: i64) -> Result<Vec<Product>> {
    let query = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products p \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM product_metrics pm \
             WHERE pm.product_id = p.id AND pm.created_at >= NOW() - INTERVAL '7 days' \
         ) \
         ORDER BY p.created_at DESC, p.id DESC \
         LIMIT $1"
    );
    Ok(sqlx::query_as::<_, Product>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

/// Counts listings on other platforms whose titles share the product's key terms and category.
pub async fn count_similar_products(pool: &PgPool, product: &Product) -> Result<i64> {
    let terms = analysis::extract_key_terms(&product.title);

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM products WHERE LOWER(platform) <> ");
    query.push_bind(product.platform.to_lowercase());

    if let Some(pattern) = analysis::similarity_pattern(&terms) {
        query.push(" AND LOWER(title) LIKE ").push_bind(pattern);
    }
    if let Some(category) = product.category.as_deref().filter(|c| !c.trim().is_empty()) {
        query
            .push(" AND LOWER(category) = ")
            .push_bind(category.to_lowercase());
    }

    Ok(query.build_query_scalar::<i64>().fetch_one(pool).await?)
}

pub async fn trending_categories(
    pool: &PgPool,
    min_products: i64,
    limit: i64,
) -> Result<Vec<CategoryTrend>> {
    Ok(sqlx::query_as::<_, CategoryTrend>(
        r#"
        SELECT
            p.category,
            COUNT(*) AS product_count,
            AVG(pm.trend_score) AS avg_trend_score,
            AVG(pm.opportunity_score) AS avg_opportunity_score
        FROM products p
        JOIN product_metrics pm ON p.id = pm.product_id
        WHERE p.category IS NOT NULL AND p.category <> ''
        GROUP BY p.category
        HAVING COUNT(*) >= $1
        ORDER BY avg_trend_score DESC NULLS LAST, avg_opportunity_score DESC NULLS LAST
        LIMIT $2
        "#,
    )
    .bind(min_products)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Winning rows for products created within the last `hours` with a score at or above `threshold`.
pub async fn recent_high_opportunities(
    pool: &PgPool,
    hours: i32,
    threshold: f64,
    limit: i64,
) -> Result<Vec<WinningProduct>> {
    let query = format!(
        "SELECT {PRODUCT_COLUMNS}, {WINNING_EXTRA_COLUMNS} FROM winning_products \
         WHERE created_at >= NOW() - make_interval(hours => $1) \
         AND opportunity_score >= $2 \
         ORDER BY opportunity_score DESC, id \
         LIMIT $3"
    );
    Ok(sqlx::query_as::<_, WinningProduct>(&query)
        .bind(hours)
        .bind(threshold)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let products = vec![
        (
            "Wireless Ergonomic Mouse",
            "Etsy",
            "Electronics",
            89.0,
            Some(140),
            8.6,
            7.4,
        ),
        (
            "Handmade Ceramic Planter",
            "Etsy",
            "Home & Garden",
            34.5,
            Some(65),
            6.8,
            5.9,
        ),
        (
            "Adjustable Dumbbell Set",
            "eBay",
            "Sports",
            149.99,
            Some(320),
            7.9,
            7.8,
        ),
        (
            "Minimalist Leather Wallet",
            "Shopify",
            "Fashion",
            45.0,
            None,
            7.1,
            6.4,
        ),
    ];

    let date_analyzed = NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?;
    let mut product_ids = Vec::new();

    for (title, platform, category, price, sales_count, trend, opportunity) in products {
        let mut product = NewProduct::new(title, platform);
        product.category = Some(category.to_string());
        product.price = Some(price);
        product.sales_count = sales_count;
        product.tags = vec![category.to_lowercase()];

        let stored = upsert_product(pool, None, &product).await?;
        record_metric(
            pool,
            &NewMetric {
                product_id: stored.id,
                date_analyzed: Some(date_analyzed),
                trend_score: Some(trend),
                competition_level: Some(analysis::CompetitionLevel::Medium.as_str().to_string()),
                profit_potential: Some(analysis::profit_potential(price, sales_count, platform)),
                market_demand: Some(6.5),
                keyword_difficulty: Some(4.0),
                ai_recommendation: Some(format!("Seeded sample for {category}")),
                opportunity_score: Some(opportunity),
            },
        )
        .await?;
        product_ids.push(stored.id);
    }

    upsert_keyword(
        pool,
        None,
        &NewKeyword {
            keyword: "wireless mouse".to_string(),
            platform: Some("Etsy".to_string()),
            search_volume: Some(12_400),
            competition_score: Some(0.42),
            trend_direction: Some("rising".to_string()),
            related_products: product_ids.iter().take(1).copied().collect(),
        },
    )
    .await?;

    let session = create_session(
        pool,
        &NewSession {
            session_name: "Seed research run".to_string(),
            platforms: vec!["Etsy".to_string(), "eBay".to_string(), "Shopify".to_string()],
            keywords_searched: vec!["wireless mouse".to_string()],
        },
    )
    .await?;
    update_session_progress(pool, session.id, product_ids.len() as i32, 2).await?;
    finish_session(pool, session.id, crate::models::STATUS_COMPLETED).await?;

    Ok(())
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let summary = import_records(pool, reader).await?;

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        path = %csv_path.display(),
        "product import finished"
    );
    Ok(summary)
}

/// Inserts every well-formed record. Rows that fail to parse or that the
/// database rejects as bad input are logged and counted as skipped.
async fn import_records<R: std::io::Read>(
    pool: &PgPool,
    mut reader: csv::Reader<R>,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        title: String,
        platform: String,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        price: Option<f64>,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        sales_count: Option<i32>,
        #[serde(default)]
        rating: Option<f64>,
        #[serde(default)]
        review_count: Option<i32>,
        #[serde(default)]
        seller_info: Option<String>,
        #[serde(default)]
        product_url: Option<String>,
        /// `|`-separated list.
        #[serde(default)]
        image_urls: Option<String>,
        #[serde(default)]
        description: Option<String>,
        /// `|`-separated list.
        #[serde(default)]
        tags: Option<String>,
    }

    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) if err.is_io_error() => {
                return Err(err).with_context(|| format!("failed to read CSV record {}", line + 1));
            }
            Err(err) => {
                warn!(record = line + 1, error = %err, "skipping malformed CSV record");
                summary.skipped += 1;
                continue;
            }
        };
        let product = NewProduct {
            title: row.title,
            platform: row.platform,
            category: row.category,
            price: row.price,
            currency: row.currency.or_else(|| Some(crate::models::DEFAULT_CURRENCY.to_string())),
            sales_count: row.sales_count,
            rating: row.rating,
            review_count: row.review_count,
            seller_info: row.seller_info,
            product_url: row.product_url,
            image_urls: split_list(row.image_urls.as_deref()),
            description: row.description,
            tags: split_list(row.tags.as_deref()),
        };

        match upsert_product(pool, None, &product).await {
            Ok(stored) => {
                debug!(id = stored.id, "imported product");
                summary.inserted += 1;
            }
            Err(
                err @ (StoreError::MissingField(_)
                | StoreError::InvalidValue { .. }
                | StoreError::NotNullViolation(_)
                | StoreError::Malformed(_)),
            ) => {
                warn!(record = line + 1, error = %err, "skipping invalid product row");
                summary.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(summary)
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::STATUS_COMPLETED;

    #[test]
    fn split_list_trims_and_drops_empty_items() {
        assert_eq!(
            split_list(Some(" https://a.example/1.jpg | |https://a.example/2.jpg")),
            vec!["https://a.example/1.jpg", "https://a.example/2.jpg"]
        );
        assert!(split_list(None).is_empty());
        assert!(split_list(Some("")).is_empty());
    }

    async fn product_with_score(pool: &PgPool, title: &str, platform: &str, score: f64) -> i32 {
        let product = upsert_product(pool, None, &NewProduct::new(title, platform))
            .await
            .unwrap();
        record_metric(
            pool,
            &NewMetric {
                product_id: product.id,
                opportunity_score: Some(score),
                ..NewMetric::default()
            },
        )
        .await
        .unwrap();
        product.id
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn winning_products_contains_scored_mouse(pool: PgPool) {
        let id = product_with_score(&pool, "Wireless Mouse", "Etsy", 8.5).await;

        let winners = winning_products(&pool, None).await.unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].product.id, id);
        assert_eq!(winners[0].product.title, "Wireless Mouse");
        assert_eq!(winners[0].opportunity_score, 8.5);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn platform_summary_counts_products_and_winners(pool: PgPool) {
        product_with_score(&pool, "Wireless Mouse", "Etsy", 8.0).await;
        product_with_score(&pool, "Ceramic Planter", "Etsy", 5.0).await;
        upsert_product(&pool, None, &NewProduct::new("Unscored Lamp", "Etsy"))
            .await
            .unwrap();
        upsert_product(&pool, None, &NewProduct::new("Unscored Kettle", "Amazon"))
            .await
            .unwrap();

        let summary = platform_summary(&pool).await.unwrap();
        assert_eq!(summary.len(), 1);
        let etsy = &summary[0];
        assert_eq!(etsy.platform, "Etsy");
        assert_eq!(etsy.total_products, 2);
        assert_eq!(etsy.winning_products_count, 1);
        assert_eq!(etsy.avg_opportunity_score, Some(6.5));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn metric_for_missing_product_is_rejected(pool: PgPool) {
        let err = record_metric(
            &pool,
            &NewMetric {
                product_id: 999_999,
                opportunity_score: Some(9.0),
                ..NewMetric::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn winning_view_keeps_every_snapshot_sorted(pool: PgPool) {
        let id = product_with_score(&pool, "Wireless Mouse", "Etsy", 7.2).await;
        record_metric(
            &pool,
            &NewMetric {
                product_id: id,
                opportunity_score: Some(9.1),
                ..NewMetric::default()
            },
        )
        .await
        .unwrap();
        product_with_score(&pool, "Dumbbell Set", "eBay", 8.0).await;
        product_with_score(&pool, "Planter", "Etsy", 6.9).await;

        let winners = winning_products(&pool, None).await.unwrap();
        let scores: Vec<f64> = winners.iter().map(|w| w.opportunity_score).collect();
        assert_eq!(scores, vec![9.1, 8.0, 7.2]);
        assert!(winners
            .iter()
            .all(|w| w.opportunity_score >= analysis::WINNING_THRESHOLD));

        let again = winning_products(&pool, None).await.unwrap();
        assert_eq!(winning_rows(&winners), winning_rows(&again));
    }

    fn winning_rows(rows: &[WinningProduct]) -> Vec<(i32, String, f64, Option<f64>, Option<f64>)> {
        rows.iter()
            .map(|w| {
                (
                    w.product.id,
                    w.product.title.clone(),
                    w.opportunity_score,
                    w.trend_score,
                    w.profit_potential,
                )
            })
            .collect()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn platform_summary_rereads_are_identical(pool: PgPool) {
        let mut priced = NewProduct::new("Wireless Mouse", "Etsy");
        priced.price = Some(24.0);
        let stored = upsert_product(&pool, None, &priced).await.unwrap();
        for score in [8.0, 6.0] {
            record_metric(
                &pool,
                &NewMetric {
                    product_id: stored.id,
                    opportunity_score: Some(score),
                    ..NewMetric::default()
                },
            )
            .await
            .unwrap();
        }
        product_with_score(&pool, "Dumbbell Set", "eBay", 5.0).await;

        let first = platform_summary(&pool).await.unwrap();
        let second = platform_summary(&pool).await.unwrap();
        assert_eq!(first, second);

        let etsy = first.iter().find(|row| row.platform == "Etsy").unwrap();
        assert_eq!(etsy.total_products, 1);
        assert_eq!(etsy.winning_products_count, 1);
        assert_eq!(etsy.avg_price, Some(24.0));
        assert_eq!(etsy.avg_opportunity_score, Some(7.0));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn oversized_platform_is_malformed(pool: PgPool) {
        let platform = "p".repeat(60);
        let err = upsert_product(&pool, None, &NewProduct::new("Wireless Mouse", &platform))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn loose_numbers_and_currency_are_stored(pool: PgPool) {
        let mut product = NewProduct::new("Wireless Mouse", "Etsy");
        product.price = Some(-1.0);
        product.currency = Some("US".to_string());
        let stored = upsert_product(&pool, None, &product).await.unwrap();
        assert_eq!(stored.price, Some(-1.0));
        assert_eq!(stored.currency.as_deref(), Some("US"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn text_is_stored_as_given(pool: PgPool) {
        let stored = upsert_product(&pool, None, &NewProduct::new(" Wireless Mouse ", "Etsy "))
            .await
            .unwrap();
        assert_eq!(stored.title, " Wireless Mouse ");
        assert_eq!(stored.platform, "Etsy ");

        let keyword = upsert_keyword(
            &pool,
            None,
            &NewKeyword {
                keyword: " mouse ".to_string(),
                ..NewKeyword::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(keyword.keyword, " mouse ");

        let session = create_session(
            &pool,
            &NewSession {
                session_name: " Spring sweep".to_string(),
                ..NewSession::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(session.session_name, " Spring sweep");
        let finished = finish_session(&pool, session.id, "done ").await.unwrap();
        assert_eq!(finished.status, "done ");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn import_skips_bad_rows_between_good_ones(pool: PgPool) {
        let oversized = "p".repeat(60);
        let data = format!(
            "title,platform,price\n\
             Wireless Mouse,Etsy,19.99\n\
             Yoga Mat,Amazon,abc\n\
             Desk Lamp,{oversized},30\n\
             ,Etsy,5\n\
             Ceramic Planter,Etsy,24.5\n"
        );
        let reader = csv::Reader::from_reader(data.as_bytes());

        let summary = import_records(&pool, reader).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 3);

        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM products ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(titles, vec!["Wireless Mouse", "Ceramic Planter"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn updating_product_refreshes_updated_at(pool: PgPool) {
        let created = upsert_product(&pool, None, &NewProduct::new("Wireless Mouse", "Etsy"))
            .await
            .unwrap();
        assert_eq!(created.currency.as_deref(), Some("USD"));

        let mut changed = NewProduct::new("Wireless Mouse Pro", "Etsy");
        changed.tags = vec!["office".to_string(), "gaming".to_string()];
        let updated = upsert_product(&pool, Some(created.id), &changed).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Wireless Mouse Pro");
        assert_eq!(updated.tags, vec!["office", "gaming"]);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);

        let missing = upsert_product(&pool, Some(999_999), &changed).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn duplicate_listings_are_allowed(pool: PgPool) {
        let first = upsert_product(&pool, None, &NewProduct::new("Wireless Mouse", "Etsy"))
            .await
            .unwrap();
        let second = upsert_product(&pool, None, &NewProduct::new("Wireless Mouse", "Etsy"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn keyword_related_products_are_not_checked(pool: PgPool) {
        let keyword = upsert_keyword(
            &pool,
            None,
            &NewKeyword {
                keyword: "wireless mouse".to_string(),
                platform: Some("Etsy".to_string()),
                related_products: vec![424_242],
                ..NewKeyword::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(keyword.related_products, vec![424_242]);

        let updated = upsert_keyword(
            &pool,
            Some(keyword.id),
            &NewKeyword {
                keyword: "wireless mouse".to_string(),
                platform: Some("Etsy".to_string()),
                search_volume: Some(900),
                trend_direction: Some("rising".to_string()),
                ..NewKeyword::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.search_volume, Some(900));
        assert!(updated.related_products.is_empty());

        let by_platform = keywords_for_platform(&pool, "Etsy").await.unwrap();
        assert_eq!(by_platform.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn session_lifecycle_accepts_any_status(pool: PgPool) {
        let session = create_session(
            &pool,
            &NewSession {
                session_name: "Spring sweep".to_string(),
                platforms: vec!["Etsy".to_string()],
                keywords_searched: vec!["planter".to_string()],
            },
        )
        .await
        .unwrap();
        assert_eq!(session.status, "active");
        assert!(session.completed_at.is_none());

        let progressed = update_session_progress(&pool, session.id, 12, 3).await.unwrap();
        assert_eq!(progressed.products_found, 12);
        assert_eq!(progressed.opportunities_identified, 3);

        let finished = finish_session(&pool, session.id, STATUS_COMPLETED).await.unwrap();
        assert_eq!(finished.status, "completed");
        assert!(finished.completed_at.is_some());

        let reopened = finish_session(&pool, session.id, "archived").await.unwrap();
        assert_eq!(reopened.status, "archived");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn pending_analysis_skips_recently_scored(pool: PgPool) {
        product_with_score(&pool, "Wireless Mouse", "Etsy", 8.0).await;
        let fresh = upsert_product(&pool, None, &NewProduct::new("Ceramic Planter", "Etsy"))
            .await
            .unwrap();

        let pending = products_pending_analysis(&pool, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn similar_products_come_from_other_platforms(pool: PgPool) {
        let mut mouse = NewProduct::new("Wireless Gaming Mouse", "Etsy");
        mouse.category = Some("Electronics".to_string());
        let target = upsert_product(&pool, None, &mouse).await.unwrap();

        for platform in ["eBay", "Amazon", "Etsy"] {
            let mut other = NewProduct::new("Wireless RGB Gaming Mouse", platform);
            other.category = Some("electronics".to_string());
            upsert_product(&pool, None, &other).await.unwrap();
        }

        assert_eq!(count_similar_products(&pool, &target).await.unwrap(), 2);
    }
}
