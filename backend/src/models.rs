use serde::Serialize;
use serde_json::{Map, Value};

/// Response body for every prediction request. The result payload is
/// flattened next to `success`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetaStyle {
    /// `"metadata": {"features_used", "target"}`
    #[default]
    Metadata,
    /// `"analysis_meta": {"feature_count", "status"}`
    Analysis,
}

impl MetaStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "metadata" => Some(MetaStyle::Metadata),
            "analysis" | "analysis_meta" => Some(MetaStyle::Analysis),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TargetMeta {
    pub features_used: usize,
    pub target: &'static str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AnalysisMeta {
    pub feature_count: usize,
    pub status: &'static str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SurvivalResult {
    pub survived: bool,
    /// Percentage, one decimal.
    pub probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TargetMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_meta: Option<AnalysisMeta>,
}

impl SurvivalResult {
    pub fn new(probability: f32, threshold: f32, feature_count: usize, target: &'static str, style: MetaStyle) -> Self {
        let (metadata, analysis_meta) = match style {
            MetaStyle::Metadata => (
                Some(TargetMeta {
                    features_used: feature_count,
                    target,
                }),
                None,
            ),
            MetaStyle::Analysis => (
                None,
                Some(AnalysisMeta {
                    feature_count,
                    status: "complete",
                }),
            ),
        };
        SurvivalResult {
            survived: probability >= threshold,
            probability: round_to(f64::from(probability.clamp(0.0, 1.0)) * 100.0, 1),
            metadata,
            analysis_meta,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PriceResult {
    pub price: f64,
    pub formatted_price: String,
    pub message: String,
    pub inputs: Map<String, Value>,
}

impl PriceResult {
    pub fn new(value: f32, inputs: Map<String, Value>) -> Self {
        let price = round_to(f64::from(value), 2);
        PriceResult {
            price,
            formatted_price: format_currency(price),
            message: "Prediction successful".to_string(),
            inputs,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    Survival(SurvivalResult),
    Price(PriceResult),
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `$1,234,567.89`; negative amounts keep the sign after the symbol.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("${}{}.{}", sign, grouped, cents)
}
