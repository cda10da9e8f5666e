use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineConfig;

/// Countries requested when no entity selection is given.
pub const DEFAULT_ENTITIES: [&str; 86] = [
    "ARG", "ARM", "AUS", "AUT", "AZE", "BGD", "BLR", "BEL", "BOL", "BIH", "BRA", "BGR", "CAN",
    "CHL", "CHN", "COL", "CRI", "HRV", "CYP", "CZE", "DNK", "DOM", "ECU", "EGY", "SLV", "EST",
    "FIN", "FRA", "GEO", "DEU", "GRC", "HUN", "IND", "IRN", "IRL", "ITA", "JPN", "KAZ", "KEN",
    "KWT", "KGZ", "LVA", "LTU", "LUX", "MYS", "MLT", "MEX", "MDA", "MNG", "MNE", "MAR", "NLD",
    "NZL", "NGA", "MKD", "NOR", "OMN", "PAK", "PER", "PHL", "POL", "PRT", "PRI", "QAT", "ROU",
    "RUS", "SRB", "SGP", "SVK", "SVN", "ZAF", "KOR", "ESP", "LKA", "SWE", "CHE", "TWN", "TJK",
    "THA", "TUN", "TUR", "UKR", "GBR", "USA", "URY", "VNM",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
}

/// Settings for the remote generation data API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Attempts per request when the server fails transiently.
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub entities: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ember-energy.org".into(),
            api_key: None,
            max_attempts: 5,
            retry_delay_secs: 20,
            timeout_secs: 60,
            entities: DEFAULT_ENTITIES.iter().map(|e| e.to_string()).collect(),
        }
    }
}
