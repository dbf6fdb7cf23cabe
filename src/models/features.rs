use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Switches for calendar-derived columns.
///
/// The holiday switches are accepted but currently produce constant-zero
/// placeholder columns; no holiday calendar is bundled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DateFeatureConfig {
    pub month: bool,
    pub year: bool,
    pub quarter: bool,
    pub month_sin: bool,
    pub month_cos: bool,
    pub quarter_sin: bool,
    pub quarter_cos: bool,
    pub number_of_holidays_governmental: bool,
    pub number_of_holidays_religious: bool,
    pub periods_until_next_governmental_holiday: bool,
    pub periods_until_next_religious_holiday: bool,
    pub number_of_ramadan_days_in_month: bool,
}

/// Parameters for lag, rolling, trend and change columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NumericalFeatureConfig {
    pub lag_periods: Vec<usize>,
    pub rolling_windows: Vec<usize>,
    pub trend_periods: Vec<usize>,
    pub change_periods: Vec<usize>,
    pub include_statistics: bool,
    pub include_trend_features: bool,
    /// Columns to derive features from. Empty means the project's value column.
    pub target_columns: Vec<String>,
}

/// The full feature configuration, snapshotted into every feature artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureConfig {
    pub date_features: DateFeatureConfig,
    pub numerical_features: NumericalFeatureConfig,
}

/// Human-readable labels for the date switches and the ranges offered for
/// numerical parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOptions {
    /// Switch name to label, in catalog order.
    pub date_features: Map<String, Json>,
    pub numerical_options: NumericalOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalOptions {
    pub lag_periods: Vec<usize>,
    pub rolling_windows: Vec<usize>,
    pub trend_periods: Vec<usize>,
    pub change_periods: Vec<usize>,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        let labels = [
            ("month", "Month (1-12)"),
            ("year", "Year"),
            ("quarter", "Quarter (1-4)"),
            ("month_sin", "Month Sine"),
            ("month_cos", "Month Cosine"),
            ("quarter_sin", "Quarter Sine"),
            ("quarter_cos", "Quarter Cosine"),
            ("number_of_holidays_governmental", "Governmental Holidays Count"),
            ("number_of_holidays_religious", "Religious Holidays Count"),
            (
                "periods_until_next_governmental_holiday",
                "Periods Until Next Govt Holiday",
            ),
            (
                "periods_until_next_religious_holiday",
                "Periods Until Next Religious Holiday",
            ),
            ("number_of_ramadan_days_in_month", "Ramadan Days in Month"),
        ];

        Self {
            date_features: labels
                .iter()
                .map(|(k, v)| (k.to_string(), Json::from(*v)))
                .collect(),
            numerical_options: NumericalOptions {
                lag_periods: (1..=30).collect(),
                rolling_windows: (3..=30).collect(),
                trend_periods: (3..=30).collect(),
                change_periods: (1..=12).collect(),
            },
        }
    }
}
