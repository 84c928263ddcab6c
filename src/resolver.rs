use crate::{
    error::DagError,
    file::IoFile,
    graph::Dag,
    job::{JobId, RuleId},
    persistence::Persistence,
    rule::Rule,
    wildcards::Wildcards,
};
use std::collections::{HashMap, HashSet};
use tracing::trace;

impl<R: Rule, P: Persistence> Dag<R, P> {
    /// Construct a target job for a rule with no file context (the user
    /// named a rule directly as a target). Wildcards default to empty.
    pub fn rule_to_job(&mut self, rule: RuleId) -> JobId {
        self.jobs.intern(&self.rules, rule, Wildcards::new())
    }

    /// Enumerate the candidate jobs that could produce `file`: every rule
    /// whose `is_producer` matches, each instantiated with the wildcards
    /// implied by `file`. Fails with `MissingRule` if none match.
    pub fn file_to_jobs(&mut self, file: &R::File) -> Result<Vec<JobId>, DagError> {
        let mut candidates = Vec::new();
        for rule_id in self.rules.ids() {
            let rule = self.rules.get(rule_id);
            if !rule.is_producer(file) {
                continue;
            }
            let Some(wildcards) = rule.wildcards_for(file) else {
                continue;
            };
            candidates.push(self.jobs.intern(&self.rules, rule_id, wildcards));
        }
        if candidates.is_empty() {
            return Err(DagError::MissingRule {
                file: file.to_string(),
            });
        }
        Ok(candidates)
    }

    /// Where this job ranks among candidates for the same file: higher is
    /// more preferred. Ties break on declaration order (earlier wins).
    fn preference(&self, job: JobId) -> (i64, std::cmp::Reverse<u32>) {
        let rule = self.rule(self.job(job).rule);
        (rule.priority_class(), std::cmp::Reverse(rule.definition_order()))
    }

    /// Select one producer job for `file` among `candidates`, expanding it
    /// recursively and inserting it into the graph.
    ///
    /// `candidates` are sorted preferred-first. The first one whose
    /// dependencies resolve without error wins. If a later, tied-preference
    /// candidate also resolves, that is an `AmbiguousRule` unless
    /// `ignore_ambiguity` is set, in which case the first success is used
    /// unconditionally and no further candidates are examined.
    pub fn update(
        &mut self,
        candidates: &[JobId],
        file: Option<&R::File>,
    ) -> Result<JobId, DagError> {
        update(self, candidates, file, &mut HashSet::new(), false, 0)
    }
}

pub(crate) fn update<R: Rule, P: Persistence>(
    dag: &mut Dag<R, P>,
    candidates: &[JobId],
    file: Option<&R::File>,
    visited: &mut HashSet<JobId>,
    skip_until_dynamic: bool,
    depth: u32,
) -> Result<JobId, DagError> {
    let mut sorted: Vec<JobId> = candidates.to_vec();
    sorted.sort_by_key(|&j| std::cmp::Reverse(dag.preference(j)));

    let mut producer: Option<JobId> = None;
    let mut cycles: Vec<JobId> = Vec::new();
    let mut exceptions: Vec<DagError> = Vec::new();

    for candidate in sorted {
        let forms_cycle = visited.contains(&candidate)
            || file.is_some_and(|f| dag.job(candidate).input.iter().any(|i| i == f));
        if forms_cycle {
            cycles.push(candidate);
            continue;
        }

        let mut branch_visited = visited.clone();
        branch_visited.insert(candidate);
        match update_one(dag, candidate, &mut branch_visited, skip_until_dynamic, depth + 1) {
            Ok(()) => {
                if let Some(prev) = producer {
                    if !dag.ignore_ambiguity && !(dag.preference(candidate) < dag.preference(prev)) {
                        return Err(DagError::AmbiguousRule {
                            file: file.map(|f| f.to_string()).unwrap_or_default(),
                            rule_a: dag.rule(dag.job(candidate).rule).name().to_owned(),
                            rule_b: dag.rule(dag.job(prev).rule).name().to_owned(),
                        });
                    }
                    // Strictly less preferred than the winner: no later
                    // candidate (even less preferred, by sortedness) could
                    // tie either, so stop looking.
                    break;
                } else {
                    producer = Some(candidate);
                    if dag.ignore_ambiguity {
                        break;
                    }
                    // Keep scanning to detect a tie with the next candidate.
                }
            }
            Err(e @ (DagError::MissingInput { .. } | DagError::Cyclic { .. })) => {
                exceptions.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    match producer {
        Some(p) => Ok(p),
        None => {
            if let Some(job) = cycles.into_iter().next() {
                Err(DagError::Cyclic {
                    rule: dag.rule(dag.job(job).rule).name().to_owned(),
                    file: file.map(|f| f.to_string()).unwrap_or_default(),
                })
            } else if let Some(e) = exceptions.into_iter().next() {
                Err(e)
            } else {
                Err(DagError::MissingRule {
                    file: file.map(|f| f.to_string()).unwrap_or_default(),
                })
            }
        }
    }
}

/// Expand a single candidate job: resolve its inputs (recursively, via
/// `update`), record the producer edges, and check for missing inputs.
/// Memoised: a job already present in `deps` returns immediately.
fn update_one<R: Rule, P: Persistence>(
    dag: &mut Dag<R, P>,
    job: JobId,
    visited: &mut HashSet<JobId>,
    skip_until_dynamic: bool,
    depth: u32,
) -> Result<(), DagError> {
    if dag.deps.contains_key(&job) {
        return Ok(());
    }
    if depth > dag.recursion_limit {
        let rule_name = dag.rule(dag.job(job).rule).name().to_owned();
        let file = dag
            .job(job)
            .output
            .first()
            .map(|f| f.to_string())
            .unwrap_or_default();
        return Err(DagError::RecursionLimit { file, rule: rule_name });
    }

    dag.deps.entry(job).or_default();

    let skip_until_dynamic = skip_until_dynamic && dag.job(job).dynamic_output.is_empty();

    let potential = collect_potential_dependencies(dag, job)?;

    let mut producer: HashMap<R::File, JobId> = HashMap::new();
    let mut exceptions: HashMap<R::File, DagError> = HashMap::new();

    for (file, candidates) in potential {
        let dynamic_input = dag.job(job).dynamic_input.contains(&file);
        match update(
            dag,
            &candidates,
            Some(&file),
            visited,
            skip_until_dynamic || dynamic_input,
            depth,
        ) {
            Ok(p) => {
                producer.insert(file, p);
            }
            Err(e @ (DagError::MissingInput { .. } | DagError::Cyclic { .. })) => {
                exceptions.insert(file, e);
            }
            Err(e) => return Err(e),
        }
    }

    for (file, p) in &producer {
        dag.deps
            .entry(job)
            .or_default()
            .entry(*p)
            .or_default()
            .insert(file.clone());
        dag.rdeps
            .entry(*p)
            .or_default()
            .entry(job)
            .or_default()
            .insert(file.clone());
    }

    let missing: Vec<R::File> = dag
        .job(job)
        .missing_input()
        .into_iter()
        .filter(|f| !producer.contains_key(f))
        .collect();
    if !missing.is_empty() {
        let causes: Vec<DagError> = missing
            .iter()
            .filter_map(|f| exceptions.remove(f))
            .collect();
        let noproducer: Vec<String> = missing
            .iter()
            .filter(|f| !exceptions.contains_key(f))
            .map(|f| f.to_string())
            .collect();
        let rule_name = dag.rule(dag.job(job).rule).name().to_owned();
        dag.delete_job(job, false);
        return Err(DagError::MissingInput {
            rule: rule_name,
            files: noproducer,
            causes,
        });
    }

    if skip_until_dynamic {
        dag.dynamic.insert(job);
    }

    Ok(())
}

/// For each of `job`'s input files, the candidate jobs that could produce
/// it. Files with no producing rule are silently dropped (assumed
/// external).
fn collect_potential_dependencies<R: Rule, P: Persistence>(
    dag: &mut Dag<R, P>,
    job: JobId,
) -> Result<Vec<(R::File, Vec<JobId>)>, DagError> {
    trace!(?job, "collecting potential dependencies");
    let inputs: Vec<R::File> = {
        let mut seen = std::collections::HashSet::new();
        dag.job(job)
            .input
            .iter()
            .cloned()
            .filter(|f| seen.insert(f.clone()))
            .collect()
    };
    let mut out = Vec::new();
    for file in inputs {
        match dag.file_to_jobs(&file) {
            Ok(candidates) => out.push((file, candidates)),
            Err(DagError::MissingRule { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
