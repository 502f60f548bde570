//! Evaluation datasets and cases.
//!
//! A dataset is built once per evaluation run and read-only afterward.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EvalLoopError, Result};
use crate::id::generate_case_id;

/// Typed payload of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseData {
    /// A query with an optional reference answer.
    Query {
        query: String,
        #[serde(default)]
        expected: Option<String>,
    },
    /// A pre-recorded output, scored offline.
    Recorded {
        #[serde(default)]
        query: String,
        output: Value,
        #[serde(default)]
        expected: Option<String>,
    },
    /// Output of a controller iteration wrapped for validation.
    Task {
        task: Value,
        #[serde(default)]
        expected: Option<String>,
    },
    /// Free-form payload.
    Raw { data: Value },
}

impl CaseData {
    /// Reference answer, if the case carries one.
    pub fn expected(&self) -> Option<&str> {
        match self {
            CaseData::Query { expected, .. }
            | CaseData::Recorded { expected, .. }
            | CaseData::Task { expected, .. } => expected.as_deref(),
            CaseData::Raw { .. } => None,
        }
    }

    /// The query text, if any.
    pub fn query(&self) -> Option<&str> {
        match self {
            CaseData::Query { query, .. } | CaseData::Recorded { query, .. } => Some(query.as_str()),
            CaseData::Task { .. } | CaseData::Raw { .. } => None,
        }
    }
}

/// One immutable unit of evaluation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalDataCase {
    case_id: String,
    dataset_id: String,
    data: CaseData,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl EvalDataCase {
    pub fn new(case_id: impl Into<String>, dataset_id: impl Into<String>, data: CaseData) -> Self {
        Self {
            case_id: case_id.into(),
            dataset_id: dataset_id.into(),
            data,
            metadata: Map::new(),
        }
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn data(&self) -> &CaseData {
        &self.data
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Line format accepted by [`EvalDataset::from_jsonl`].
#[derive(Debug, Deserialize)]
struct CaseLine {
    #[serde(default)]
    case_id: Option<String>,
    #[serde(flatten)]
    data: CaseData,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// An ordered collection of cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalDataset {
    pub dataset_id: String,
    pub run_id: String,
    cases: Vec<EvalDataCase>,
}

impl EvalDataset {
    pub fn new(dataset_id: impl Into<String>, run_id: impl Into<String>, cases: Vec<EvalDataCase>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            run_id: run_id.into(),
            cases,
        }
    }

    /// Dataset holding exactly one case.
    pub fn single(run_id: impl Into<String>, case: EvalDataCase) -> Self {
        let dataset_id = case.dataset_id().to_string();
        Self::new(dataset_id, run_id, vec![case])
    }

    /// Load a dataset from a JSONL file, one case per line.
    ///
    /// Each line is a [`CaseData`] object (tagged by `kind`) with optional
    /// `case_id` and `metadata`. Blank lines are skipped.
    pub fn from_jsonl(path: impl AsRef<Path>, dataset_id: &str, run_id: &str) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut cases = Vec::new();
        let mut seen = HashSet::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: CaseLine = serde_json::from_str(&line)?;
            let case_id = parsed
                .case_id
                .unwrap_or_else(|| generate_case_id(dataset_id, cases.len()));
            if !seen.insert(case_id.clone()) {
                return Err(EvalLoopError::InvalidConfig(format!(
                    "duplicate case_id '{}' in {}",
                    case_id,
                    path.as_ref().display()
                )));
            }
            let mut case = EvalDataCase::new(case_id, dataset_id, parsed.data);
            case.metadata = parsed.metadata;
            cases.push(case);
        }

        log::debug!("Loaded {} cases for dataset {}", cases.len(), dataset_id);
        Ok(Self::new(dataset_id, run_id, cases))
    }

    pub fn cases(&self) -> &[EvalDataCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
