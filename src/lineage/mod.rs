// coati is a version control tool for data science projects
// Copyright (C) 2025  The coati authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

pub mod store;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WorkspaceError;

/// A logical artefact: a resource, optionally narrowed to a subpath.
/// Equality is by the pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageRef {
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl LineageRef {
    pub fn new(resource: impl Into<String>, subpath: Option<String>) -> Self {
        Self {
            resource: resource.into(),
            subpath,
        }
    }

    pub fn key(&self) -> String {
        match &self.subpath {
            Some(subpath) => format!("{}/{subpath}", self.resource),
            None => self.resource.clone(),
        }
    }
}

impl fmt::Display for LineageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// The current provenance of a lineage reference: the producing step's
/// identity, or a resource-version hash for source data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Certificate {
    Step { step: String, generation: u64 },
    SourceData { version_hash: String },
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Certificate::Step { step, generation } => {
                write!(f, "step '{step}' (generation {generation})")
            }
            Certificate::SourceData { version_hash } => {
                write!(f, "source data at version {}", crate::hashing::short(version_hash))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub reference: LineageRef,
    pub certificate: Certificate,
}

/// Metadata about one executed pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    /// Re-runs of the same step get increasing generations; superseded
    /// generations stay in the table as history.
    pub generation: u64,
    pub started: DateTime<Utc>,
    pub duration_secs: f64,
    pub inputs: Vec<StepInput>,
    pub outputs: Vec<LineageRef>,
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
    /// The script that ran this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<LineageRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDataRecord {
    pub reference: LineageRef,
    pub version_hash: String,
    pub captured: DateTime<Utc>,
}

/// An in-flight step between begin and end.
#[derive(Debug)]
pub struct StepToken {
    name: String,
    started: DateTime<Utc>,
    inputs: Vec<StepInput>,
    parameters: BTreeMap<String, serde_json::Value>,
    code: Option<LineageRef>,
}

/// The lineage working set: a vertex map from lineage references to their
/// live certificates, the step table holding every recorded generation,
/// and the source-data records captured when an unknown input first
/// appears.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LineageGraph {
    certificates: BTreeMap<String, Certificate>,
    steps: Vec<StepRecord>,
    sources: BTreeMap<String, SourceDataRecord>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.steps.is_empty() && self.sources.is_empty()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceDataRecord> {
        self.sources.values()
    }

    pub fn certificate(&self, reference: &LineageRef) -> Option<&Certificate> {
        self.certificates.get(&reference.key())
    }

    fn step(&self, name: &str, generation: u64) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|step| step.name == name && step.generation == generation)
    }

    fn next_generation(&self, name: &str) -> u64 {
        self.steps.iter().filter(|step| step.name == name).count() as u64
    }

    /// Begin recording a step. Inputs without a live certificate are
    /// captured as source data using `version_resolver`, which maps a
    /// resource name to its current version hash.
    pub fn begin_step(
        &mut self,
        name: &str,
        inputs: Vec<LineageRef>,
        parameters: BTreeMap<String, serde_json::Value>,
        code: Option<LineageRef>,
        version_resolver: &mut dyn FnMut(&str) -> Result<String>,
    ) -> Result<StepToken> {
        let mut resolved = Vec::with_capacity(inputs.len());
        for reference in inputs {
            let certificate = match self.certificates.get(&reference.key()) {
                Some(certificate) => certificate.clone(),
                None => {
                    let version_hash = version_resolver(&reference.resource)?;
                    let certificate = Certificate::SourceData {
                        version_hash: version_hash.clone(),
                    };
                    self.sources.insert(
                        reference.key(),
                        SourceDataRecord {
                            reference: reference.clone(),
                            version_hash,
                            captured: Utc::now(),
                        },
                    );
                    self.certificates
                        .insert(reference.key(), certificate.clone());
                    certificate
                }
            };
            resolved.push(StepInput {
                reference,
                certificate,
            });
        }

        Ok(StepToken {
            name: name.to_string(),
            started: Utc::now(),
            inputs: resolved,
            parameters,
            code,
        })
    }

    /// Finish a step: check the transitive input closure for consistency,
    /// then commit the record and point the output certificates at it.
    /// Superseded step generations stay in the table but become
    /// unreachable through the vertex map.
    pub fn end_step(
        &mut self,
        token: StepToken,
        outputs: Vec<LineageRef>,
        metrics: Option<BTreeMap<String, f64>>,
    ) -> Result<()> {
        self.check_consistency(&token.inputs)?;

        let generation = self.next_generation(&token.name);
        let duration_secs = (Utc::now() - token.started).num_milliseconds() as f64 / 1000.0;
        let record = StepRecord {
            name: token.name.clone(),
            generation,
            started: token.started,
            duration_secs,
            inputs: token.inputs,
            outputs: outputs.clone(),
            parameters: token.parameters,
            metrics,
            code: token.code,
        };

        for output in outputs {
            self.certificates.insert(
                output.key(),
                Certificate::Step {
                    step: token.name.clone(),
                    generation,
                },
            );
        }
        self.steps.push(record);
        Ok(())
    }

    /// Walk the closure reachable from `inputs` and verify no lineage
    /// reference is certified twice with disagreeing provenance.
    fn check_consistency(&self, inputs: &[StepInput]) -> Result<()> {
        let mut seen: BTreeMap<String, Certificate> = BTreeMap::new();
        let mut visited_steps: BTreeSet<(String, u64)> = BTreeSet::new();
        let mut queue: Vec<StepInput> = inputs.to_vec();

        while let Some(input) = queue.pop() {
            let key = input.reference.key();
            if let Some(previous) = seen.get(&key) {
                if *previous != input.certificate {
                    return Err(WorkspaceError::inconsistency(format!(
                        "inconsistent lineage for '{}': certified by {} and by {}",
                        input.reference, previous, input.certificate
                    )));
                }
                continue;
            }
            seen.insert(key, input.certificate.clone());

            if let Certificate::Step { step, generation } = &input.certificate {
                if !visited_steps.insert((step.clone(), *generation)) {
                    continue;
                }
                if let Some(record) = self.step(step, *generation) {
                    queue.extend(record.inputs.iter().cloned());
                }
            }
        }
        Ok(())
    }
}
