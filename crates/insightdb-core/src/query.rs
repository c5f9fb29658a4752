//! Turns a company + question-type selection into retrieval queries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    SampleInterviewQuestions,
    InterviewProcess,
    Resources,
    Advice,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::SampleInterviewQuestions,
        QueryKind::InterviewProcess,
        QueryKind::Resources,
        QueryKind::Advice,
    ];

    pub fn label(self) -> &'static str {
        match self {
            QueryKind::SampleInterviewQuestions => "Sample Interview Questions",
            QueryKind::InterviewProcess => "Interview Process",
            QueryKind::Resources => "Resources",
            QueryKind::Advice => "Advice",
        }
    }

    pub fn query_for(self, company: &str) -> String {
        format!("Give me {} only for {}.", self.label().to_lowercase(), company)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

impl FromStr for QueryKind {
    type Err = Error;

    /// Accepts the label in any case, or its kebab/snake-case form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase().replace(['-', '_'], " ");
        QueryKind::ALL
            .into_iter()
            .find(|k| k.label().to_lowercase() == norm)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown query kind '{s}'")))
    }
}

/// One query per selected kind; the custom question is used only when no kind
/// is selected.
pub fn compose_queries(company: &str, kinds: &[QueryKind], custom: Option<&str>) -> Result<Vec<String>, Error> {
    let company = company.trim();
    if company.is_empty() {
        return Err(Error::EmptyQuery("no company selected".into()));
    }
    if !kinds.is_empty() {
        return Ok(kinds.iter().map(|k| k.query_for(company)).collect());
    }
    match custom.map(str::trim) {
        Some(q) if !q.is_empty() => Ok(vec![q.to_string()]),
        _ => Err(Error::EmptyQuery("select a query type or enter a question".into())),
    }
}
