use crate::traits::FallbackReason;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Every strategy fell back ({})", describe(.skipped))]
    Exhausted { skipped: Vec<(String, FallbackReason)> },
}

fn describe(skipped: &[(String, FallbackReason)]) -> String {
    skipped
        .iter()
        .map(|(name, reason)| format!("{}: {}", name, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
