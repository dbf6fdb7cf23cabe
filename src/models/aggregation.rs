use serde::{Deserialize, Serialize};

/// The time-bucket size used for resampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// The period requested by a client.
///
/// Conversion-style names describe the source and target frequency; only the
/// target matters for resampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPeriod {
    DailyToWeekly,
    DailyToMonthly,
    WeeklyToMonthly,
    Daily,
    Weekly,
    Monthly,
}

impl AggregationPeriod {
    pub const ALL: [AggregationPeriod; 6] = [
        Self::DailyToWeekly,
        Self::DailyToMonthly,
        Self::WeeklyToMonthly,
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
    ];

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Daily => Granularity::Daily,
            Self::DailyToWeekly | Self::Weekly => Granularity::Weekly,
            Self::DailyToMonthly | Self::WeeklyToMonthly | Self::Monthly => Granularity::Monthly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyToWeekly => "daily_to_weekly",
            Self::DailyToMonthly => "daily_to_monthly",
            Self::WeeklyToMonthly => "weekly_to_monthly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// How the values falling into one period bucket are reduced to one value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationFunction {
    Mean,
    Sum,
    Min,
    Max,
    Median,
    Std,
    Count,
    First,
}

impl AggregationFunction {
    pub const ALL: [AggregationFunction; 8] = [
        Self::Mean,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Median,
        Self::Std,
        Self::Count,
        Self::First,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::Count => "count",
            Self::First => "first",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Whether the function can reduce non-numeric cells.
    pub fn accepts_text(&self) -> bool {
        matches!(self, Self::First | Self::Count)
    }
}

/// How periods absent from a secondary source are populated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    #[default]
    Zero,
    Forward,
    Backward,
    Mean,
    Interpolate,
}

impl FillPolicy {
    pub const ALL: [FillPolicy; 5] = [
        Self::Zero,
        Self::Forward,
        Self::Backward,
        Self::Mean,
        Self::Interpolate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Mean => "mean",
            Self::Interpolate => "interpolate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

fn default_main_aggregation() -> AggregationFunction {
    AggregationFunction::Sum
}

/// Request body for an aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub period: AggregationPeriod,
    /// Reduction applied to the project's value column.
    #[serde(default = "default_main_aggregation")]
    pub main_value_aggregation: AggregationFunction,
}

/// Catalog of accepted aggregation settings, for clients building forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationOptions {
    pub periods: Vec<AggregationPeriod>,
    pub aggregation_functions: Vec<AggregationFunction>,
    pub fill_methods: Vec<FillPolicy>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            periods: AggregationPeriod::ALL.to_vec(),
            aggregation_functions: AggregationFunction::ALL.to_vec(),
            fill_methods: FillPolicy::ALL.to_vec(),
        }
    }
}
