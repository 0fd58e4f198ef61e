//! Fundamental types shared across YieldLens.
//!
//! `AnalysisResult` is the canonical shape produced by the normalizer and
//! consumed by the dashboard. It serializes in camelCase for HTTP clients;
//! the model's own wire format is handled in `normalizer`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal shown when a prediction produced no value and none existed before.
pub const NOT_PREDICTED: &str = "Not predicted";

/// The structured analysis shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Narrative findings, in display order.
    pub key_insights: Vec<String>,
    /// Factors most strongly tied to yield, in rank order.
    pub top_yield_impact_factors: Vec<String>,
    /// Actionable recommendations.
    pub optimization_suggestions: Vec<String>,
    /// `None` until a prediction has been produced. Explanatory text such as
    /// "Unable to predict with given inputs." is a real value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_yield: Option<String>,
    #[serde(default)]
    pub visualizations: Vec<Visualization>,
}

/// A prediction response normalized into the same envelope as an analysis.
pub type PartialAnalysisResult = AnalysisResult;

/// Which list field of an `AnalysisResult` is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultField {
    KeyInsights,
    TopYieldImpactFactors,
    OptimizationSuggestions,
    PredictedYield,
    Visualizations,
}

impl AnalysisResult {
    /// Borrow one of the three narrative lists.
    pub fn list(&self, field: ResultField) -> Option<&Vec<String>> {
        match field {
            ResultField::KeyInsights => Some(&self.key_insights),
            ResultField::TopYieldImpactFactors => Some(&self.top_yield_impact_factors),
            ResultField::OptimizationSuggestions => Some(&self.optimization_suggestions),
            ResultField::PredictedYield | ResultField::Visualizations => None,
        }
    }

    /// Mutable access to one of the three narrative lists.
    pub fn list_mut(&mut self, field: ResultField) -> Option<&mut Vec<String>> {
        match field {
            ResultField::KeyInsights => Some(&mut self.key_insights),
            ResultField::TopYieldImpactFactors => Some(&mut self.top_yield_impact_factors),
            ResultField::OptimizationSuggestions => Some(&mut self.optimization_suggestions),
            ResultField::PredictedYield | ResultField::Visualizations => None,
        }
    }
}

/// Chart types the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartKind {
    /// Parse the model's `type` string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            "scatter" => Some(ChartKind::Scatter),
            _ => None,
        }
    }

    /// Whether this kind plots values against shared category labels.
    pub fn is_categorical(self) -> bool {
        !matches!(self, ChartKind::Scatter)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
        };
        f.write_str(s)
    }
}

/// One renderable chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub title: String,
    pub kind: ChartKind,
    pub data: ChartData,
}

impl Visualization {
    /// Number of series carried by this chart.
    pub fn series_count(&self) -> usize {
        match &self.data {
            ChartData::Categorical { series, .. } => series.len(),
            ChartData::Scatter { series } => series.len(),
        }
    }
}

/// Series payload of a chart. The two shapes never mix within one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "shape",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ChartData {
    /// Bar, line and pie charts: every series has one value per label.
    Categorical {
        category_labels: Vec<String>,
        series: Vec<ValueSeries>,
    },
    /// Scatter charts: each series is a list of coordinates.
    Scatter { series: Vec<PointSeries> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSeries {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSeries {
    pub label: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The two kinds of model-backed flows a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Analysis,
    Prediction,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Analysis => f.write_str("analysis"),
            FlowKind::Prediction => f.write_str("prediction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_kind_parse() {
        assert_eq!(ChartKind::parse("bar"), Some(ChartKind::Bar));
        assert_eq!(ChartKind::parse(" Scatter "), Some(ChartKind::Scatter));
        assert_eq!(ChartKind::parse("PIE"), Some(ChartKind::Pie));
        assert_eq!(ChartKind::parse("doughnut"), None);
        assert!(ChartKind::Line.is_categorical());
        assert!(!ChartKind::Scatter.is_categorical());
    }

    #[test]
    fn test_analysis_result_serializes_camel_case() {
        let result = AnalysisResult {
            key_insights: vec!["Supplier B underperforms".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["keyInsights"][0], "Supplier B underperforms");
        assert!(json["topYieldImpactFactors"].as_array().unwrap().is_empty());
        assert!(json.get("predictedYield").is_none());
        assert!(json["visualizations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_chart_data_shape_tag() {
        let viz = Visualization {
            title: "Average Yield by Supplier".into(),
            kind: ChartKind::Bar,
            data: ChartData::Categorical {
                category_labels: vec!["A".into(), "B".into()],
                series: vec![ValueSeries {
                    label: "Yield (%)".into(),
                    values: vec![92.5, 88.1],
                }],
            },
        };
        let json = serde_json::to_value(&viz).unwrap();
        assert_eq!(json["kind"], "bar");
        assert_eq!(json["data"]["shape"], "categorical");
        assert_eq!(json["data"]["categoryLabels"][1], "B");
        let restored: Visualization = serde_json::from_value(json).unwrap();
        assert_eq!(restored, viz);
        assert_eq!(restored.series_count(), 1);
    }

    #[test]
    fn test_list_accessors() {
        let mut result = AnalysisResult::default();
        result
            .list_mut(ResultField::TopYieldImpactFactors)
            .unwrap()
            .push("Temperature".into());
        assert_eq!(
            result.list(ResultField::TopYieldImpactFactors).unwrap(),
            &vec!["Temperature".to_string()]
        );
        assert!(result.list(ResultField::PredictedYield).is_none());
    }

    #[test]
    fn test_flow_kind_display() {
        assert_eq!(FlowKind::Analysis.to_string(), "analysis");
        assert_eq!(FlowKind::Prediction.to_string(), "prediction");
    }
}
