use crate::{
    config::DagConfig,
    file::IoFile,
    job::{JobId, JobRecord, JobStore, RuleId, RuleTable},
    needrun::Reason,
    persistence::Persistence,
    rule::Rule,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::debug;

/// The build DAG: bidirectional job graph, derived execution sets, and the
/// collaborators (rule table, persistence probe) needed to resolve and
/// drive it.
///
/// `deps[j]` maps each producer of `j` to the files it supplies; `rdeps[j]`
/// maps each consumer of `j` to the files it requires from `j`. Both maps
/// are insertion-ordered so that iteration, and therefore visualisation and
/// scheduling, is deterministic.
pub struct Dag<R: Rule, P: Persistence = crate::persistence::NeverIncomplete> {
    pub(crate) rules: RuleTable<R>,
    pub(crate) jobs: JobStore<R::File>,

    pub(crate) deps: IndexMap<JobId, IndexMap<JobId, IndexSet<R::File>>>,
    pub(crate) rdeps: IndexMap<JobId, IndexMap<JobId, IndexSet<R::File>>>,

    pub(crate) needrun: IndexSet<JobId>,
    pub(crate) reason: HashMap<JobId, Reason<R::File>>,
    pub(crate) finished: IndexSet<JobId>,
    pub(crate) dynamic: IndexSet<JobId>,
    pub(crate) ready: IndexSet<JobId>,

    pub(crate) targetjobs: IndexSet<JobId>,
    pub(crate) targetfiles: Vec<R::File>,
    pub(crate) targetrules: IndexSet<RuleId>,

    pub(crate) forcerules: IndexSet<RuleId>,
    pub(crate) forcefiles: IndexSet<R::File>,
    pub(crate) priorityrules: IndexSet<RuleId>,
    pub(crate) priorityfiles: IndexSet<R::File>,
    /// Jobs synthesized by dynamic re-expansion that should not be re-forced
    /// by a subsequent `postprocess`.
    pub(crate) omitforce: IndexSet<JobId>,

    pub(crate) ignore_ambiguity: bool,
    pub(crate) recursion_limit: u32,

    pub(crate) persistence: P,

    len: usize,
}

impl<R: Rule, P: Persistence> Dag<R, P> {
    pub fn new(
        rules: Vec<R>,
        targetrules: Vec<usize>,
        targetfiles: Vec<R::File>,
        config: DagConfig<R::File>,
        persistence: P,
    ) -> Self {
        let mut table = RuleTable::default();
        let rule_ids: Vec<RuleId> = rules.into_iter().map(|r| table.push(r)).collect();

        let mut forcerules: IndexSet<RuleId> = if config.forceall {
            rule_ids.iter().copied().collect()
        } else {
            config
                .forcerules
                .iter()
                .filter_map(|&i| rule_ids.get(i).copied())
                .collect()
        };
        let targetrule_ids: IndexSet<RuleId> = targetrules
            .iter()
            .filter_map(|&i| rule_ids.get(i).copied())
            .collect();
        let mut forcefiles: IndexSet<R::File> = config.forcefiles.into_iter().collect();
        if config.forcetargets {
            forcerules.extend(targetrule_ids.iter().copied());
            forcefiles.extend(targetfiles.iter().cloned());
        }
        let priorityrules: IndexSet<RuleId> = config
            .priorityrules
            .iter()
            .filter_map(|&i| rule_ids.get(i).copied())
            .collect();
        let priorityfiles: IndexSet<R::File> = config.priorityfiles.into_iter().collect();

        Dag {
            rules: table,
            jobs: JobStore::default(),
            deps: IndexMap::new(),
            rdeps: IndexMap::new(),
            needrun: IndexSet::new(),
            reason: HashMap::new(),
            finished: IndexSet::new(),
            dynamic: IndexSet::new(),
            ready: IndexSet::new(),
            targetjobs: IndexSet::new(),
            targetfiles,
            targetrules: targetrule_ids,
            forcerules,
            forcefiles,
            priorityrules,
            priorityfiles,
            omitforce: IndexSet::new(),
            ignore_ambiguity: config.ignore_ambiguity,
            recursion_limit: if config.recursion_limit == 0 {
                1000
            } else {
                config.recursion_limit
            },
            persistence,
            len: 0,
        }
    }

    pub fn job(&self, id: JobId) -> &JobRecord<R::File> {
        self.jobs.get(id)
    }

    pub fn rule(&self, id: RuleId) -> &R {
        self.rules.get(id)
    }

    /// All jobs reachable from the target jobs via `deps`.
    pub fn jobs(&self) -> Vec<JobId> {
        self.bfs_deps(self.targetjobs.iter().copied(), |_| false)
    }

    /// Jobs in `needrun`, stopping traversal at already-finished jobs.
    pub fn needrun_jobs(&self) -> Vec<JobId> {
        self.bfs_deps(self.targetjobs.iter().copied(), |j| self.finished(j))
            .into_iter()
            .filter(|j| self.needrun(*j))
            .collect()
    }

    pub fn ready_jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        self.ready.iter().copied()
    }

    pub fn ready(&self, job: JobId) -> bool {
        self.ready.contains(&job)
    }

    pub fn needrun(&self, job: JobId) -> bool {
        self.needrun.contains(&job)
    }

    /// Finished, or never needed to run at all.
    pub fn noneedrun_finished(&self, job: JobId) -> bool {
        !self.needrun(job) || self.finished(job)
    }

    pub fn reason(&self, job: JobId) -> Reason<R::File> {
        self.reason.get(&job).cloned().unwrap_or_default()
    }

    pub fn finished(&self, job: JobId) -> bool {
        self.finished.contains(&job)
    }

    pub fn dynamic(&self, job: JobId) -> bool {
        self.dynamic.contains(&job)
    }

    pub fn target_jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        self.targetjobs.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `job`'s own producers, i.e. the jobs it depends on.
    pub fn producers(&self, job: JobId) -> Vec<JobId> {
        self.deps
            .get(&job)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The files a job's consumers request from it.
    pub fn requested_files(&self, job: JobId) -> IndexSet<R::File> {
        self.rdeps
            .get(&job)
            .into_iter()
            .flat_map(|m| m.values())
            .flatten()
            .cloned()
            .collect()
    }

    /// Wildcard bindings new at this job, not already bound by any of its
    /// producers. Used by the DOT visualiser to avoid repeating wildcards
    /// that are implied by an upstream job.
    pub fn new_wildcards(&self, job: JobId) -> Vec<(String, String)> {
        let mut new_wildcards: std::collections::BTreeSet<(String, String)> = self
            .jobs
            .get(job)
            .wildcards
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(producers) = self.deps.get(&job) {
            for producer in producers.keys() {
                if new_wildcards.is_empty() {
                    return Vec::new();
                }
                for wildcard in &self.jobs.get(*producer).wildcards {
                    new_wildcards.remove(&(wildcard.0.clone(), wildcard.1.clone()));
                }
            }
        }
        new_wildcards.into_iter().collect()
    }

    /// Breadth-first traversal over `deps` (producer direction) from the
    /// given roots, skipping successors of any node matching `stop`.
    /// Deterministic given insertion-ordered adjacency.
    pub(crate) fn bfs_deps(
        &self,
        roots: impl IntoIterator<Item = JobId>,
        stop: impl Fn(JobId) -> bool,
    ) -> Vec<JobId> {
        self.bfs(&self.deps, roots, stop)
    }

    /// Breadth-first traversal over `rdeps` (consumer direction).
    pub(crate) fn bfs_rdeps(
        &self,
        roots: impl IntoIterator<Item = JobId>,
        stop: impl Fn(JobId) -> bool,
    ) -> Vec<JobId> {
        self.bfs(&self.rdeps, roots, stop)
    }

    fn bfs(
        &self,
        direction: &IndexMap<JobId, IndexMap<JobId, IndexSet<R::File>>>,
        roots: impl IntoIterator<Item = JobId>,
        stop: impl Fn(JobId) -> bool,
    ) -> Vec<JobId> {
        let mut queue: std::collections::VecDeque<JobId> = roots.into_iter().collect();
        let mut visited: IndexSet<JobId> = queue.iter().copied().collect();
        let mut out = Vec::new();
        while let Some(job) = queue.pop_front() {
            if stop(job) {
                continue;
            }
            out.push(job);
            if let Some(neighbours) = direction.get(&job) {
                for next in neighbours.keys() {
                    if visited.insert(*next) {
                        queue.push_back(*next);
                    }
                }
            }
        }
        out
    }

    /// Remove `job` from both edge maps and all derived sets. If
    /// `recursive`, any former producer of `job` left with no remaining
    /// consumers is deleted too.
    pub(crate) fn delete_job(&mut self, job: JobId, recursive: bool) {
        if let Some(consumers) = self.rdeps.swap_remove(&job) {
            for consumer in consumers.keys() {
                if let Some(m) = self.deps.get_mut(consumer) {
                    m.shift_remove(&job);
                }
            }
        }
        let mut to_check = Vec::new();
        if let Some(producers) = self.deps.swap_remove(&job) {
            for producer in producers.keys() {
                let mut orphaned = false;
                if let Some(m) = self.rdeps.get_mut(producer) {
                    m.shift_remove(&job);
                    orphaned = m.is_empty();
                }
                if orphaned && recursive {
                    to_check.push(*producer);
                }
            }
        }
        if self.needrun.shift_remove(&job) {
            self.len -= 1;
            self.reason.remove(&job);
        }
        self.finished.shift_remove(&job);
        self.dynamic.shift_remove(&job);
        self.ready.shift_remove(&job);

        for producer in to_check {
            self.delete_job(producer, true);
        }
    }

    /// Replace `job` with `newjob`, preserving `job`'s consumers (except
    /// those whose rule carries dynamic input, which the dynamic
    /// re-expander rewrites separately). `newjob` is resolved by `update`
    /// before consumers are re-attached, so this never double-wires edges:
    /// `update` only wires `newjob` to *its own* producers, never to its
    /// future consumers.
    pub(crate) fn replace_job(&mut self, job: JobId, newjob: JobId) -> Result<(), crate::error::DagError>
    where
        R::File: IoFile,
    {
        let depending: Vec<(JobId, IndexSet<R::File>)> = self
            .rdeps
            .get(&job)
            .map(|m| m.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default();
        let was_finished = self.finished(job);
        let was_target = self.targetjobs.contains(&job);

        self.delete_job(job, true);
        crate::resolver::update(self, &[newjob], None, &mut Default::default(), false, 0)?;

        if was_finished {
            self.finished.insert(newjob);
        }
        for (consumer, files) in depending {
            let consumer_dynamic_input = !self.jobs.get(consumer).dynamic_input.is_empty();
            if !consumer_dynamic_input {
                self.deps
                    .entry(consumer)
                    .or_default()
                    .entry(newjob)
                    .or_default()
                    .extend(files.iter().cloned());
                self.rdeps
                    .entry(newjob)
                    .or_default()
                    .entry(consumer)
                    .or_default()
                    .extend(files);
            }
        }
        if was_target {
            self.targetjobs.remove(&job);
            self.targetjobs.insert(newjob);
        }
        Ok(())
    }

    /// Register a rule concretised by dynamic re-expansion, carrying over
    /// force-status from the rule it replaces.
    pub(crate) fn replace_rule(&mut self, old: RuleId, new: R) -> RuleId {
        let new_id = self.rules.push(new);
        if self.forcerules.contains(&old) {
            self.forcerules.insert(new_id);
        }
        debug!(?old, ?new_id, "replaced rule by dynamic branch");
        new_id
    }
}
