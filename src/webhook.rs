//! Notifications posted to the workflow engine's webhook.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{BatchSummary, ResearchSession, WinningProduct};

#[derive(Debug, Serialize)]
pub struct ResearchNotification {
    pub workflow_id: String,
    pub status: String,
    pub summary: NotificationSummary,
    pub top_opportunities: Vec<WinningProduct>,
}

#[derive(Debug, Serialize)]
pub struct NotificationSummary {
    pub total_products: i32,
    pub high_opportunities: usize,
    pub top_platform: Option<String>,
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OpportunityAlert {
    pub alert_type: &'static str,
    pub timestamp: DateTime<Utc>,
    pub opportunities_found: usize,
    pub products: Vec<WinningProduct>,
}

impl ResearchNotification {
    pub fn new(
        session: &ResearchSession,
        batch: &BatchSummary,
        top_platform: Option<String>,
        top_opportunities: Vec<WinningProduct>,
    ) -> Self {
        Self {
            workflow_id: format!("research_{}", session.id),
            status: session.status.clone(),
            summary: NotificationSummary {
                total_products: session.products_found,
                high_opportunities: batch.high_opportunity,
                top_platform,
                completion_time: session.completed_at,
            },
            top_opportunities,
        }
    }
}

impl OpportunityAlert {
    pub fn new(products: Vec<WinningProduct>) -> Self {
        Self {
            alert_type: "high_opportunity",
            timestamp: Utc::now(),
            opportunities_found: products.len(),
            products,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    research_url: String,
}

impl WebhookClient {
    pub fn new(research_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            research_url: research_url.to_string(),
        })
    }

    /// Alerts go to the sibling `/alerts` hook when the research hook ends in `/research`.
    pub fn alerts_url(&self) -> String {
        match self.research_url.strip_suffix("/research") {
            Some(base) => format!("{base}/alerts"),
            None => self.research_url.clone(),
        }
    }

    pub async fn send_research(&self, notification: &ResearchNotification) -> bool {
        self.post(&self.research_url, notification).await
    }

    pub async fn send_alert(&self, alert: &OpportunityAlert) -> bool {
        self.post(&self.alerts_url(), alert).await
    }

    /// Delivery failures are logged, never propagated.
    async fn post<T: Serialize>(&self, url: &str, payload: &T) -> bool {
        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(url, status = %resp.status(), "webhook delivered");
                true
            }
            Ok(resp) => {
                warn!(url, status = %resp.status(), "webhook rejected notification");
                false
            }
            Err(e) => {
                warn!(url, error = %e, "webhook delivery failed");
                false
            }
        }
    }
}
