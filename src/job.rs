use crate::{rule::Rule, wildcards::Wildcards};
use std::collections::HashMap;
use std::fmt;

/// An interned identifier for a [`Rule`] value, indexing into a
/// [`RuleTable`]. Jobs refer to rules by id rather than by value so that
/// `replace_rule` can swap in a concretised rule without walking every job
/// that mentions the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

pub struct RuleTable<R: Rule> {
    rules: Vec<R>,
}

impl<R: Rule> Default for RuleTable<R> {
    fn default() -> Self {
        RuleTable { rules: Vec::new() }
    }
}

impl<R: Rule> RuleTable<R> {
    pub fn push(&mut self, rule: R) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(rule);
        id
    }

    pub fn get(&self, id: RuleId) -> &R {
        &self.rules[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        (0..self.rules.len() as u32).map(RuleId)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// An interned identifier for a [`JobRecord`], indexing into a [`JobStore`].
///
/// Jobs require stable identity and hashing across their full lifetime, so
/// they're interned once by `(rule, wildcards)` in a single owning arena
/// rather than compared structurally everywhere. `replace_job` becomes
/// "allocate a new id, rewrite incoming edges, forget the old id".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u32);

/// A `(Rule, wildcard-binding)` pair together with its precomputed file
/// lists. The file lists are snapshotted at interning time since a job's
/// wildcard binding never changes after creation.
#[derive(Debug, Clone)]
pub struct JobRecord<F> {
    pub rule: RuleId,
    pub wildcards: Wildcards,
    pub input: Vec<F>,
    pub output: Vec<F>,
    pub dynamic_input: Vec<F>,
    pub dynamic_output: Vec<F>,
    pub temp_output: Vec<F>,
    pub protected_output: Vec<F>,
    /// Raised to `HIGHEST_PRIORITY` by `update_priority` when this job is
    /// reachable upstream from a prioritised job.
    pub priority: i64,
}

impl<F> JobRecord<F> {
    pub const HIGHEST_PRIORITY: i64 = i64::MAX;
}

impl<F: crate::file::IoFile> JobRecord<F> {
    /// Input files not currently present on disk.
    pub fn missing_input(&self) -> Vec<F> {
        self.input.iter().filter(|f| !f.exists()).cloned().collect()
    }

    /// Output files not currently present on disk, optionally restricted to
    /// a requested subset.
    pub fn missing_output(&self, requested: Option<&std::collections::HashSet<F>>) -> Vec<F> {
        self.output
            .iter()
            .filter(|f| !f.exists())
            .filter(|f| requested.map_or(true, |r| r.contains(f)))
            .cloned()
            .collect()
    }

    /// The earliest modification time among this job's existing outputs.
    pub fn output_mintime(&self) -> Option<std::time::SystemTime> {
        self.output.iter().filter_map(|f| f.mtime()).min()
    }
}

impl<F: fmt::Display> fmt::Display for JobRecord<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(out) = self.output.first() {
            write!(f, "{out}")
        } else {
            write!(f, "<no output>")
        }
    }
}

pub struct JobStore<F: Clone + Eq + std::hash::Hash + Ord> {
    jobs: Vec<JobRecord<F>>,
    interned: HashMap<(RuleId, Wildcards), JobId>,
}

impl<F: Clone + Eq + std::hash::Hash + Ord> Default for JobStore<F> {
    fn default() -> Self {
        JobStore {
            jobs: Vec::new(),
            interned: HashMap::new(),
        }
    }
}

impl<F: Clone + Eq + std::hash::Hash + Ord> JobStore<F> {
    /// Look up the id of an already-interned `(rule, wildcards)` pair.
    pub fn find(&self, rule: RuleId, wildcards: &Wildcards) -> Option<JobId> {
        self.interned.get(&(rule, wildcards.clone())).copied()
    }

    /// Intern a job, computing its file lists via `rule`. Returns the
    /// existing id if this `(rule, wildcards)` pair was already interned.
    pub fn intern<R>(&mut self, rule_table: &RuleTable<R>, rule: RuleId, wildcards: Wildcards) -> JobId
    where
        R: Rule<File = F>,
    {
        if let Some(id) = self.find(rule, &wildcards) {
            return id;
        }
        let r = rule_table.get(rule);
        let record = JobRecord {
            input: r.expand_input(&wildcards),
            output: r.expand_output(&wildcards),
            dynamic_input: r.dynamic_input_files(&wildcards),
            dynamic_output: r.dynamic_output_files(&wildcards),
            temp_output: r.temp_output_files(&wildcards),
            protected_output: r.protected_output_files(&wildcards),
            rule,
            wildcards: wildcards.clone(),
            priority: 0,
        };
        let id = JobId(self.jobs.len() as u32);
        self.jobs.push(record);
        self.interned.insert((rule, wildcards), id);
        id
    }

    pub fn get(&self, id: JobId) -> &JobRecord<F> {
        &self.jobs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: JobId) -> &mut JobRecord<F> {
        &mut self.jobs[id.0 as usize]
    }
}
