use std::fmt::Display;

use serde::{Deserialize, Serialize};

//--------------------------------------      RiskLevel       --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Thresholds on the composite risk score (not the trust score).
    pub fn from_risk_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }
}

impl Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------      Dimension       --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Geographic,
    Temporal,
    Transaction,
    Device,
    Category,
    Historical,
}

impl Dimension {
    pub fn weight(&self) -> f64 {
        match self {
            Dimension::Geographic => 0.20,
            Dimension::Temporal => 0.15,
            Dimension::Transaction => 0.25,
            Dimension::Device => 0.15,
            Dimension::Category => 0.10,
            Dimension::Historical => 0.15,
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dimension::Geographic => "geographic",
            Dimension::Temporal => "temporal",
            Dimension::Transaction => "transaction",
            Dimension::Device => "device",
            Dimension::Category => "category",
            Dimension::Historical => "historical",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------   DimensionScore     --------------------------------------------------------
/// One sub-analysis result: a 0-100 risk score for a single behavioural dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub score: f64,
}

//--------------------------------------   Recommendation     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    ProceedWithCaution,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplementaryRecommendation {
    VerifyAddress,
    LimitAmount,
}

//--------------------------------------      Confidence      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

//--------------------------------------     TrustReport      --------------------------------------------------------
/// The trust engine's verdict over a requester's history. Attached to a `PaymentRequest` at creation and immutable
/// from then on; it is never recomputed retroactively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReport {
    /// 0-100; higher is more trustworthy.
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    pub dimension_scores: Vec<DimensionScore>,
    /// The top-3 highest-risk dimensions, only those scoring above 50.
    pub primary_concerns: Vec<DimensionScore>,
    pub risk_factors: Vec<String>,
    pub positive_factors: Vec<String>,
    pub recommendation: Recommendation,
    pub supplementary: Vec<SupplementaryRecommendation>,
    pub confidence: Confidence,
}

impl TrustReport {
    /// The report attached when the requester has no usable history, or when scoring degenerates. Creation of a
    /// request must never fail because of scoring, so this is the universal fallback.
    pub fn neutral() -> Self {
        Self {
            trust_score: 50.0,
            risk_level: RiskLevel::Medium,
            dimension_scores: Vec::new(),
            primary_concerns: Vec::new(),
            risk_factors: Vec::new(),
            positive_factors: vec!["No prior request history".to_string()],
            recommendation: Recommendation::ProceedWithCaution,
            supplementary: Vec::new(),
            confidence: Confidence::Low,
        }
    }
}
