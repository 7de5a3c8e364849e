use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod analysis;
mod config;
mod db;
mod error;
mod llm;
mod models;
mod pipeline;
mod report;
mod webhook;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::models::{NewKeyword, NewMetric, NewProduct, NewSession, DEFAULT_CURRENCY};
use crate::webhook::{OpportunityAlert, WebhookClient};

#[derive(Parser)]
#[command(name = "product-research")]
#[command(about = "Product research store for marketplace opportunity tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import products from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Insert a product, or update it when --id is given
    AddProduct {
        #[arg(long)]
        id: Option<i32>,
        #[arg(long)]
        title: String,
        #[arg(long)]
        platform: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, default_value = DEFAULT_CURRENCY)]
        currency: String,
        #[arg(long)]
        sales_count: Option<i32>,
        #[arg(long)]
        rating: Option<f64>,
        #[arg(long)]
        review_count: Option<i32>,
        #[arg(long)]
        seller_info: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long = "image-url")]
        image_urls: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Record a metric snapshot for an existing product
    RecordMetric {
        #[arg(long)]
        product_id: i32,
        #[arg(long)]
        opportunity_score: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        trend_score: Option<f64>,
        #[arg(long)]
        competition_level: Option<String>,
        #[arg(long)]
        profit_potential: Option<f64>,
        #[arg(long)]
        market_demand: Option<f64>,
        #[arg(long)]
        keyword_difficulty: Option<f64>,
        #[arg(long)]
        recommendation: Option<String>,
    },
    /// Show a product and its metric history
    ShowProduct {
        #[arg(long)]
        id: i32,
    },
    /// Insert a keyword, or update it when --id is given
    AddKeyword {
        #[arg(long)]
        id: Option<i32>,
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        search_volume: Option<i32>,
        #[arg(long)]
        competition_score: Option<f64>,
        #[arg(long)]
        trend_direction: Option<String>,
        #[arg(long = "related-product")]
        related_products: Vec<i32>,
    },
    /// List keywords tracked for a platform
    Keywords {
        #[arg(long)]
        platform: String,
    },
    /// Open a research session
    SessionStart {
        #[arg(long)]
        name: String,
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
    },
    /// Update the counts of a research session
    SessionProgress {
        #[arg(long)]
        id: i32,
        #[arg(long)]
        products_found: i32,
        #[arg(long)]
        opportunities: i32,
    },
    /// Close a research session with a final status
    SessionFinish {
        #[arg(long)]
        id: i32,
        #[arg(long, default_value = models::STATUS_COMPLETED)]
        status: String,
    },
    /// Show a research session
    ShowSession {
        #[arg(long)]
        id: i32,
    },
    /// List winning products (opportunity score of 7.0 or more)
    Winning {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Per-platform aggregates over scored products
    Platforms,
    /// Score products that lack a recent metric snapshot
    Analyze {
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Run a full research session: import, analyze, close and notify
    Research {
        #[arg(long)]
        name: String,
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Generate a markdown market report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Alert on fresh products scoring at or above the threshold
    Monitor {
        #[arg(long, default_value_t = 1)]
        hours: i32,
        #[arg(long, default_value_t = analysis::ALERT_THRESHOLD)]
        threshold: f64,
    },
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!(max_connections = cfg.db_max_connections, "connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} products from {} ({} skipped).",
                summary.inserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::AddProduct {
            id,
            title,
            platform,
            category,
            price,
            currency,
            sales_count,
            rating,
            review_count,
            seller_info,
            url,
            image_urls,
            description,
            tags,
        } => {
            let product = NewProduct {
                title,
                platform,
                category,
                price,
                currency: Some(currency),
                sales_count,
                rating,
                review_count,
                seller_info,
                product_url: url,
                image_urls,
                description,
                tags,
            };
            let stored = db::upsert_product(&pool, id, &product).await?;
            println!(
                "Product {} saved ({} on {}).",
                stored.id, stored.title, stored.platform
            );
        }
        Commands::RecordMetric {
            product_id,
            opportunity_score,
            date,
            trend_score,
            competition_level,
            profit_potential,
            market_demand,
            keyword_difficulty,
            recommendation,
        } => {
            let metric = db::record_metric(
                &pool,
                &NewMetric {
                    product_id,
                    date_analyzed: date,
                    trend_score,
                    competition_level: competition_level
                        .map(|label| analysis::CompetitionLevel::parse(&label).as_str().to_string()),
                    profit_potential,
                    market_demand,
                    keyword_difficulty,
                    ai_recommendation: recommendation,
                    opportunity_score: Some(opportunity_score),
                },
            )
            .await?;
            println!(
                "Metric {} recorded for product {} on {}.",
                metric.id, metric.product_id, metric.date_analyzed
            );
        }
        Commands::ShowProduct { id } => {
            let Some(product) = db::get_product(&pool, id).await? else {
                println!("Product {id} not found.");
                return Ok(());
            };
            println!(
                "{} [{}] {} {} {}",
                product.title,
                product.platform,
                product.category.as_deref().unwrap_or("uncategorized"),
                fmt_opt(product.price),
                product.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
            );
            if !product.tags.is_empty() {
                println!("Tags: {}", product.tags.join(", "));
            }
            let metrics = db::metrics_for_product(&pool, id).await?;
            if metrics.is_empty() {
                println!("No metric snapshots yet.");
            }
            for metric in metrics {
                println!(
                    "- {} score {} (trend {}, competition {})",
                    metric.date_analyzed,
                    fmt_opt(metric.opportunity_score),
                    fmt_opt(metric.trend_score),
                    metric.competition_level.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::AddKeyword {
            id,
            keyword,
            platform,
            search_volume,
            competition_score,
            trend_direction,
            related_products,
        } => {
            let stored = db::upsert_keyword(
                &pool,
                id,
                &NewKeyword {
                    keyword,
                    platform,
                    search_volume,
                    competition_score,
                    trend_direction,
                    related_products,
                },
            )
            .await?;
            println!("Keyword {} saved ({}).", stored.id, stored.keyword);
        }
        Commands::Keywords { platform } => {
            let keywords = db::keywords_for_platform(&pool, &platform).await?;
            if keywords.is_empty() {
                println!("No keywords tracked for {platform}.");
                return Ok(());
            }
            for keyword in keywords {
                println!(
                    "- {} volume {} competition {} trend {}",
                    keyword.keyword,
                    fmt_opt(keyword.search_volume),
                    fmt_opt(keyword.competition_score),
                    keyword.trend_direction.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::SessionStart {
            name,
            platforms,
            keywords,
        } => {
            let session = db::create_session(
                &pool,
                &NewSession {
                    session_name: name,
                    platforms,
                    keywords_searched: keywords,
                },
            )
            .await?;
            println!("Session {} started ({}).", session.id, session.status);
        }
        Commands::SessionProgress {
            id,
            products_found,
            opportunities,
        } => {
            let session =
                db::update_session_progress(&pool, id, products_found, opportunities).await?;
            println!(
                "Session {}: {} products, {} opportunities.",
                session.id, session.products_found, session.opportunities_identified
            );
        }
        Commands::SessionFinish { id, status } => {
            let session = db::finish_session(&pool, id, &status).await?;
            println!("Session {} is now {}.", session.id, session.status);
        }
        Commands::ShowSession { id } => {
            let Some(session) = db::get_session(&pool, id).await? else {
                println!("Session {id} not found.");
                return Ok(());
            };
            println!(
                "{} [{}] platforms: {} keywords: {} products: {} opportunities: {} completed: {}",
                session.session_name,
                session.status,
                session.platforms.join(", "),
                session.keywords_searched.join(", "),
                session.products_found,
                session.opportunities_identified,
                fmt_opt(session.completed_at)
            );
        }
        Commands::Winning { limit } => {
            let winners = db::winning_products(&pool, limit).await?;
            if winners.is_empty() {
                println!("No winning products yet.");
                return Ok(());
            }
            println!("Winning products:");
            for winner in winners {
                println!(
                    "- {} ({}) score {:.2}",
                    winner.product.title, winner.product.platform, winner.opportunity_score
                );
            }
        }
        Commands::Platforms => {
            let platforms = db::platform_summary(&pool).await?;
            if platforms.is_empty() {
                println!("No scored products yet.");
                return Ok(());
            }
            for platform in platforms {
                println!(
                    "- {}: {} products, avg price {}, avg score {}, {} winning",
                    platform.platform,
                    platform.total_products,
                    fmt_opt(platform.avg_price.map(|p| format!("{p:.2}"))),
                    fmt_opt(platform.avg_opportunity_score.map(|s| format!("{s:.2}"))),
                    platform.winning_products_count
                );
            }
        }
        Commands::Analyze { limit } => {
            let llm = LlmClient::from_config(&cfg)?;
            let summary = pipeline::batch_analyze(&pool, &llm, limit).await?;
            println!(
                "Analyzed {} products: {} high, {} medium, {} low, {} failed.",
                summary.total_analyzed,
                summary.high_opportunity,
                summary.medium_opportunity,
                summary.low_opportunity,
                summary.failed
            );
            for rec in summary.recommendations.iter().take(5) {
                println!("- {} ({}) score {:.2}", rec.title, rec.platform, rec.score);
            }
        }
        Commands::Research {
            name,
            platforms,
            keywords,
            csv,
            limit,
        } => {
            let llm = LlmClient::from_config(&cfg)?;
            let webhook = cfg
                .webhook_url
                .as_deref()
                .map(WebhookClient::new)
                .transpose()?;
            let request = pipeline::ResearchRequest {
                session_name: name,
                platforms,
                keywords,
                csv,
                analyze_limit: limit,
            };
            let outcome = pipeline::run_research(&pool, &llm, webhook.as_ref(), &request).await?;
            println!(
                "Session {} {}: {} products found, {} analyzed, {} opportunities identified{}.",
                outcome.session.id,
                outcome.session.status,
                outcome.session.products_found,
                outcome.batch.total_analyzed,
                outcome.session.opportunities_identified,
                if outcome.notified { ", webhook notified" } else { "" }
            );
        }
        Commands::Report { out } => {
            let market = pipeline::collect_market_report(&pool).await?;
            std::fs::write(&out, report::build_report(&market))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Monitor { hours, threshold } => {
            let fresh = db::recent_high_opportunities(&pool, hours, threshold, 10).await?;
            if fresh.is_empty() {
                println!("No new opportunities at or above {threshold:.1}.");
                return Ok(());
            }
            println!("{} new opportunities at or above {threshold:.1}.", fresh.len());
            match cfg.webhook_url.as_deref() {
                Some(url) => {
                    let sent = WebhookClient::new(url)?
                        .send_alert(&OpportunityAlert::new(fresh))
                        .await;
                    println!("Alert {}.", if sent { "sent" } else { "not delivered" });
                }
                None => println!("WEBHOOK_URL not set; alert not sent."),
            }
        }
    }

    Ok(())
}
