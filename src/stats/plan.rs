// src/stats/plan.rs
//
// The shared, immutable description of what gets reduced.
//
// Every worker builds the same `ReductionPlan` from the same static configuration, and
// every collective is issued by walking that plan. No worker decides from its own data
// whether a (model, snapshot) pair takes part in a reduction, so the sequence of
// collectives cannot differ between ranks.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};
use crate::stats::binning::BinSpec;
use crate::stats::pooling_rule::PoolingRule;

/// One simulation variant: its snapshots, the subset reported binned, its input files and
/// the binning of its independent variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPlan {
    pub name: String,
    pub snapshots: Vec<u32>,
    /// Snapshots for which binned results are collected; all of them when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_snapshots: Option<Vec<u32>>,
    #[serde(default)]
    pub first_file: usize,
    /// Last input file (inclusive); through the last one available when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_file: Option<usize>,
    pub bins: BinSpec,
}

impl ModelPlan {
    pub fn new(name: impl Into<String>, snapshots: Vec<u32>, bins: BinSpec) -> Self {
        Self {
            name: name.into(),
            snapshots,
            plot_snapshots: None,
            first_file: 0,
            last_file: None,
            bins,
        }
    }

    pub fn with_plot_snapshots(mut self, subset: Vec<u32>) -> Self {
        self.plot_snapshots = Some(subset);
        self
    }

    pub fn with_files(mut self, first: usize, last: usize) -> Self {
        self.first_file = first;
        self.last_file = Some(last);
        self
    }

    /// Inclusive `(first, last)` file indices this model reads out of `available` inputs,
    /// or `None` when its range lies entirely past them.
    pub fn file_span(&self, available: usize) -> Option<(usize, usize)> {
        let end = available.checked_sub(1)?;
        let last = self.last_file.map_or(end, |l| l.min(end));
        (self.first_file <= last).then_some((self.first_file, last))
    }

    /// Snapshots reported binned, in order.
    #[inline]
    pub fn plotted(&self) -> &[u32] {
        self.plot_snapshots.as_deref().unwrap_or(&self.snapshots)
    }

    /// Position of snapshot number `snap` in this model's snapshot list.
    #[inline]
    pub fn snapshot_position(&self, snap: u32) -> Option<usize> {
        self.snapshots.iter().position(|&s| s == snap)
    }

    fn validate(&self, idx: usize) -> StatsResult<()> {
        let fail = |reason: String| StatsError::InvalidPlan {
            reason: format!("model {idx} ({}): {reason}", self.name),
        };
        if self.snapshots.is_empty() {
            return Err(fail("snapshot list is empty".to_string()));
        }
        let mut seen = HashSet::with_capacity(self.snapshots.len());
        if let Some(dup) = self.snapshots.iter().find(|s| !seen.insert(**s)) {
            return Err(fail(format!("snapshot {dup} listed twice")));
        }
        if let Some(subset) = &self.plot_snapshots {
            if !is_subsequence(subset, &self.snapshots) {
                return Err(fail(format!(
                    "plot_snapshots {subset:?} is not an in-order subset of snapshots {:?}",
                    self.snapshots
                )));
            }
        }
        if let Some(last) = self.last_file.filter(|&l| l < self.first_file) {
            return Err(fail(format!(
                "last_file {last} precedes first_file {}",
                self.first_file
            )));
        }
        Ok(())
    }
}

/// `true` when `sub` appears in `full` in the same relative order.
fn is_subsequence(sub: &[u32], full: &[u32]) -> bool {
    let mut it = full.iter();
    sub.iter().all(|s| it.any(|f| f == s))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPlan {
    #[serde(default)]
    rule: PoolingRule,
    #[serde(rename = "model", default)]
    models: Vec<ModelPlan>,
}

/// Validated list of models to reduce, shared verbatim by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlan", into = "RawPlan")]
pub struct ReductionPlan {
    rule: PoolingRule,
    models: Vec<ModelPlan>,
}

impl TryFrom<RawPlan> for ReductionPlan {
    type Error = StatsError;
    fn try_from(raw: RawPlan) -> StatsResult<Self> {
        ReductionPlan::new(raw.models, raw.rule)
    }
}

impl From<ReductionPlan> for RawPlan {
    fn from(p: ReductionPlan) -> Self {
        RawPlan {
            rule: p.rule,
            models: p.models,
        }
    }
}

impl ReductionPlan {
    pub fn new(models: Vec<ModelPlan>, rule: PoolingRule) -> StatsResult<Self> {
        if models.is_empty() {
            return Err(StatsError::InvalidPlan {
                reason: "no models".to_string(),
            });
        }
        for (i, m) in models.iter().enumerate() {
            m.validate(i)?;
        }
        Ok(Self { rule, models })
    }

    pub fn from_toml_str(s: &str) -> StatsResult<Self> {
        toml::from_str(s).map_err(|e| StatsError::InvalidPlan {
            reason: e.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> StatsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StatsError::InvalidPlan {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StatsResult<String> {
        toml::to_string(self).map_err(|e| StatsError::Codec(e.to_string()))
    }

    /// Same models, different pooling rule.
    pub fn with_rule(mut self, rule: PoolingRule) -> Self {
        self.rule = rule;
        self
    }

    #[inline]
    pub fn rule(&self) -> PoolingRule {
        self.rule
    }
    #[inline]
    pub fn models(&self) -> &[ModelPlan] {
        &self.models
    }

    pub fn model(&self, idx: usize) -> StatsResult<&ModelPlan> {
        self.models
            .get(idx)
            .ok_or(StatsError::UnknownModel { model: idx })
    }

    /// Every (model, snapshot position) pair, in the order collectives are issued.
    pub fn reduction_order(&self) -> Vec<(usize, usize)> {
        self.models
            .iter()
            .enumerate()
            .flat_map(|(m, model)| (0..model.snapshots.len()).map(move |s| (m, s)))
            .collect()
    }
}
