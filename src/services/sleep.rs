/// Sleep data retrieval and local persistence
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::sleep::SleepTable;
use crate::services::summary::SleepSummary;
use chrono::NaiveDate;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

pub const SLEEP_ENDPOINT_PATH: &str = "/v1/sleep";

/// Outcome of one /sleep run
#[derive(Debug)]
pub struct SleepExport {
    pub path: PathBuf,
    pub rows: usize,
    pub summary: SleepSummary,
}

pub struct SleepService {
    client: Client,
    api_base_url: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    output_path: PathBuf,
}

impl SleepService {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            start_date: config.start_date,
            end_date: config.end_date,
            output_path: config.output_path(),
        }
    }

    /// GET the configured date range from the provider and parse it into a table
    pub async fn fetch_sleep(&self, access_token: &str) -> AppResult<SleepTable> {
        let url = format!("{}{}", self.api_base_url, SLEEP_ENDPOINT_PATH);
        let start = self.start_date.format("%Y-%m-%d").to_string();
        let end = self.end_date.format("%Y-%m-%d").to_string();

        debug!("Fetching sleep data from {} to {}", start, end);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| {
                // reqwest errors carry the URL, which embeds the token
                let e = e.without_url();
                error!("Sleep data request failed: {}", e);
                AppError::from_provider("Sleep data request failed", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Sleep data request failed: {}", status);
            return Err(AppError::ProviderUnavailable(format!(
                "Sleep data request failed: {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| {
            AppError::from_provider("Failed to read sleep data response", e.without_url())
        })?;

        let table = SleepTable::from_payload(&body)?;
        debug!(
            "Parsed {} sleep records with {} columns",
            table.row_count(),
            table.columns.len()
        );
        Ok(table)
    }

    /// Write the table to the range-derived path, replacing any earlier export
    pub async fn export(&self, table: &SleepTable) -> AppResult<SleepExport> {
        let csv = table.to_csv()?;
        atomic_write(&self.output_path, &csv).await?;

        info!(
            "Stored {} sleep records in {}",
            table.row_count(),
            self.output_path.display()
        );

        Ok(SleepExport {
            path: self.output_path.clone(),
            rows: table.row_count(),
            summary: SleepSummary::describe(table),
        })
    }

    pub async fn fetch_and_export(&self, access_token: &str) -> AppResult<SleepExport> {
        let table = self.fetch_sleep(access_token).await?;
        self.export(&table).await
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    fs::write(&tmp_path, bytes).await?;

    // rename replaces the destination on unix; clear it first elsewhere
    if cfg!(windows) && fs::try_exists(path).await.unwrap_or(false) {
        fs::remove_file(path).await?;
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(AppError::Io(e));
    }

    Ok(())
}
