//! Census Bureau ACS5 client.
//!
//! Fetches tract-level demographic variables for one state and writes the
//! array-of-arrays JSON response as a tab-separated file (first response row
//! is the header).

use crate::acquire::http::{BasicClient, UrlParam, fetch_json};
use crate::table::{TAB, Table};
use crate::transform::features::CENSUS_FIELDS;
use crate::transform::incidents::json_cell;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

const BASE_URL: &str = "https://api.census.gov/data";

pub struct CensusClient {
    base_url: String,
    year: u16,
    dataset: String,
    variables: Vec<String>,
    client: UrlParam<BasicClient>,
}

impl CensusClient {
    /// `dataset` is the census data id, e.g. `acs5`. The variable list is
    /// the fixed demographic vocabulary the feature table consumes.
    pub fn new(year: u16, dataset: &str, key: String) -> Self {
        let variables = std::iter::once("NAME".to_string())
            .chain(CENSUS_FIELDS.iter().map(|(code, _)| code.to_string()))
            .collect();
        CensusClient {
            base_url: BASE_URL.to_string(),
            year,
            dataset: dataset.to_string(),
            variables,
            client: UrlParam {
                inner: BasicClient::new(),
                param_name: "key".to_string(),
                key,
            },
        }
    }

    fn tract_url(&self, state: &str) -> String {
        format!(
            "{}/{}/{}?get={}&for=tract:*&in=state:{}",
            self.base_url,
            self.year,
            self.dataset,
            self.variables.join(","),
            state
        )
    }

    fn variables_url(&self) -> String {
        format!("{}/{}/{}/variables.json", self.base_url, self.year, self.dataset)
    }

    /// Fetches the dataset's variable metadata.
    pub async fn variable_info(&self) -> Result<Value> {
        fetch_json(&self.client, &self.variables_url()).await
    }

    /// Fetches every tract in `state` and writes the response as TSV. The
    /// census answers with an array of arrays whose first row names the
    /// columns (the requested variables plus `state`, `county`, `tract`).
    pub async fn export_tracts(&self, state: &str, output: &Path) -> Result<()> {
        let url = self.tract_url(state);
        info!(url = %url, "fetching census tract data");

        let response = fetch_json(&self.client, &url).await?;
        let rows = response
            .as_array()
            .context("census response is not an array")?;
        let mut rows = rows.iter();
        let headers = rows
            .next()
            .context("census response has no header row")?
            .as_array()
            .context("census header row is not an array")?
            .iter()
            .map(json_cell)
            .collect();

        let mut table = Table::new(headers);
        for row in rows {
            let cells = row
                .as_array()
                .context("census data row is not an array")?
                .iter()
                .map(json_cell)
                .collect();
            table.push_row(cells);
        }

        info!(tracts = table.len(), "census tract data fetched");
        table.write(output, TAB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tract_url_shape() {
        let client = CensusClient::new(2015, "acs5", "secret".to_string());
        let url = client.tract_url("36");
        assert!(url.starts_with("https://api.census.gov/data/2015/acs5?get=NAME,B01001_001E"));
        assert!(url.ends_with("&for=tract:*&in=state:36"));
        // the key travels as a query parameter added by the client wrapper
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_variables_url_shape() {
        let client = CensusClient::new(2015, "acs5", String::new());
        assert_eq!(
            client.variables_url(),
            "https://api.census.gov/data/2015/acs5/variables.json"
        );
    }
}
