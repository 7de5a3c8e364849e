use std::fmt::Write;

use crate::analysis::WINNING_THRESHOLD;
use crate::pipeline::MarketReport;

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

pub fn build_report(report: &MarketReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Product Research Market Report");
    let _ = writeln!(output, "Generated {}", report.generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- High-opportunity rows: {}",
        report.top_opportunities.len()
    );
    let _ = writeln!(
        output,
        "- Best performing platform: {}",
        report.best_platform().unwrap_or("N/A")
    );
    let _ = writeln!(
        output,
        "- Top trending category: {}",
        report.top_category().unwrap_or("N/A")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Opportunities");

    if report.top_opportunities.is_empty() {
        let _ = writeln!(output, "No products scored at or above {WINNING_THRESHOLD:.1}.");
    } else {
        for (rank, winner) in report.top_opportunities.iter().enumerate() {
            let product = &winner.product;
            let _ = writeln!(
                output,
                "{}. {} ({}, {}) score {:.2} at {}",
                rank + 1,
                product.title,
                product.platform,
                product.category.as_deref().unwrap_or("uncategorized"),
                winner.opportunity_score,
                product
                    .price
                    .map_or_else(|| "unknown price".to_string(), |p| format!("{p:.2}")),
            );
            if let Some(text) = winner.ai_recommendation.as_deref() {
                let first_line = text.lines().next().unwrap_or_default().trim();
                if !first_line.is_empty() {
                    let _ = writeln!(output, "   - {first_line}");
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Platform Performance");

    if report.platform_performance.is_empty() {
        let _ = writeln!(output, "No scored products yet.");
    } else {
        for platform in report.platform_performance.iter() {
            let _ = writeln!(
                output,
                "- {}: {} products, avg price {}, avg score {}, {} winning",
                platform.platform,
                platform.total_products,
                score(platform.avg_price),
                score(platform.avg_opportunity_score),
                platform.winning_products_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trending Categories");

    if report.trending_categories.is_empty() {
        let _ = writeln!(output, "Not enough scored products per category.");
    } else {
        for category in report.trending_categories.iter() {
            let _ = writeln!(
                output,
                "- {}: {} scored rows (avg trend {}, avg score {})",
                category.category,
                category.product_count,
                score(category.avg_trend_score),
                score(category.avg_opportunity_score)
            );
        }
    }

    output
}
