// src/analyze/mod.rs
//! Compliance analysis against a business profile, backed by an LLM.

pub mod ai_adapter;

pub use ai_adapter::{
    BusinessProfile, ChatProvider, ComplianceAnalysis, ComplianceAnalyzer, DeepSeekProvider,
    MockProvider, IMPACT_WINDOW_DAYS,
};
