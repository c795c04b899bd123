//! Device usage data
//!
//! Per-device screen time as served to the dashboard charts: hours per app
//! for the doughnut chart and hours per day for the line chart.

use serde::{Deserialize, Serialize};

use crate::client::{AuthClient, ClientResult};

/// Body of `GET /api/usage-data/<device_id>/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageData {
    /// App names
    pub labels: Vec<String>,
    /// Hours per app, parallel to `labels`
    pub data: Vec<f64>,
    #[serde(default)]
    pub daily_labels: Vec<String>,
    #[serde(default)]
    pub daily_data: Vec<f64>,
    pub device: String,
}

/// Hours spent in one app
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppUsage {
    pub name: String,
    pub hours: f64,
}

/// Usage ranked by time spent
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub device: String,
    pub apps: Vec<AppUsage>,
    pub total_hours: f64,
    pub busiest_day: Option<(String, f64)>,
}

impl UsageData {
    /// App/hours pairs; extra entries on either side are ignored
    pub fn apps(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.data.iter().copied())
    }

    pub fn summary(&self) -> UsageSummary {
        let mut apps: Vec<AppUsage> = self
            .apps()
            .map(|(name, hours)| AppUsage {
                name: name.to_string(),
                hours,
            })
            .collect();
        apps.sort_by(|a, b| b.hours.total_cmp(&a.hours));

        let busiest_day = self
            .daily_labels
            .iter()
            .zip(self.daily_data.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(day, hours)| (day.clone(), hours));

        UsageSummary {
            device: self.device.clone(),
            total_hours: apps.iter().map(|a| a.hours).sum(),
            apps,
            busiest_day,
        }
    }
}

impl AuthClient {
    /// Fetch usage data for one of the parent's devices
    pub async fn usage_data(&self, device_id: &str) -> ClientResult<UsageData> {
        let path = format!(
            "{}{}/",
            self.config().usage_path,
            urlencoding::encode(device_id)
        );
        self.get_json(&path).await
    }
}
