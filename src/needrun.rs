use crate::{file::IoFile, graph::Dag, job::JobId, persistence::Persistence, rule::Rule};
use indexmap::IndexSet;
use std::collections::{HashSet, VecDeque};

/// Why a job must run. Non-empty in any field means "this job must run";
/// all-false/all-empty means the job is up to date.
#[derive(Debug, Clone)]
pub struct Reason<F> {
    pub forced: bool,
    pub noio: bool,
    pub missing_output: IndexSet<F>,
    pub incomplete_output: IndexSet<F>,
    pub updated_input: IndexSet<F>,
    pub updated_input_run: IndexSet<F>,
}

impl<F: std::hash::Hash + Eq> Default for Reason<F> {
    fn default() -> Self {
        Reason {
            forced: false,
            noio: false,
            missing_output: IndexSet::new(),
            incomplete_output: IndexSet::new(),
            updated_input: IndexSet::new(),
            updated_input_run: IndexSet::new(),
        }
    }
}

impl<F: std::hash::Hash + Eq> Reason<F> {
    pub fn is_empty(&self) -> bool {
        !self.forced
            && !self.noio
            && self.missing_output.is_empty()
            && self.incomplete_output.is_empty()
            && self.updated_input.is_empty()
            && self.updated_input_run.is_empty()
    }
}

impl<R: Rule, P: Persistence> Dag<R, P> {
    /// Assign a [`Reason`] to each job and populate `needrun`: a seed pass
    /// (forced / target / stale-vs-output-mintime) followed by a single BFS
    /// worklist propagating both upstream (missing/incomplete output) and
    /// downstream (`updated_input_run`).
    pub fn update_needrun(&mut self) {
        self.reason.clear();
        self.needrun.clear();

        let jobs = self.jobs();
        let mut queue: VecDeque<JobId> = VecDeque::new();
        let mut visited: HashSet<JobId> = HashSet::new();

        for job in jobs {
            self.seed_reason(job);
            if !self.reason(job).is_empty() && visited.insert(job) {
                queue.push_back(job);
            }
        }

        while let Some(job) = queue.pop_front() {
            self.needrun.insert(job);

            let producers: Vec<(JobId, Vec<R::File>)> = self
                .deps
                .get(&job)
                .map(|m| m.iter().map(|(p, fs)| (*p, fs.iter().cloned().collect())).collect())
                .unwrap_or_default();
            for (producer, files) in producers {
                let requested: std::collections::HashSet<R::File> = files.into_iter().collect();
                let missing_output = self.job(producer).missing_output(Some(&requested));
                let incomplete_output: Vec<R::File> = if self.persistence.incomplete(producer) {
                    self.job(producer).output.clone()
                } else {
                    Vec::new()
                };
                let dirty = !missing_output.is_empty() || !incomplete_output.is_empty();
                let reason = self.reason.entry(producer).or_default();
                reason.missing_output.extend(missing_output);
                reason.incomplete_output.extend(incomplete_output);
                if dirty && visited.insert(producer) {
                    queue.push_back(producer);
                }
            }

            let consumers: Vec<(JobId, Vec<R::File>)> = self
                .rdeps
                .get(&job)
                .map(|m| m.iter().map(|(c, fs)| (*c, fs.iter().cloned().collect())).collect())
                .unwrap_or_default();
            for (consumer, files) in consumers {
                self.reason
                    .entry(consumer)
                    .or_default()
                    .updated_input_run
                    .extend(files);
                if visited.insert(consumer) {
                    queue.push_back(consumer);
                }
            }
        }

        self.len = self.needrun.len();
    }

    fn seed_reason(&mut self, job: JobId) {
        let forced = (!self.omitforce.contains(&job) && self.forcerules.contains(&self.job(job).rule))
            || self
                .job(job)
                .output
                .iter()
                .any(|f| self.forcefiles.contains(f));

        let mut reason = Reason::default();
        if forced {
            reason.forced = true;
        } else if self.targetjobs.contains(&job) {
            let record = self.job(job);
            if record.output.is_empty() {
                if record.input.is_empty() {
                    reason.noio = true;
                } else {
                    reason
                        .updated_input_run
                        .extend(record.input.iter().filter(|f| !f.exists()).cloned());
                }
            } else {
                let missing = if self.targetrules.contains(&record.rule) {
                    record.missing_output(None)
                } else {
                    let mut requested: std::collections::HashSet<R::File> =
                        self.requested_files(job).into_iter().collect();
                    requested.extend(self.targetfiles.iter().cloned());
                    record.missing_output(Some(&requested))
                };
                reason.missing_output.extend(missing);
            }
        }

        if reason.is_empty() {
            if let Some(t) = self.output_mintime_downstream(job) {
                let record = self.job(job);
                let updated = record
                    .input
                    .iter()
                    .filter(|f| f.exists() && f.is_newer(t))
                    .cloned();
                reason.updated_input.extend(updated);
            }
        }

        self.reason.insert(job, reason);
    }

    /// The earliest mtime among outputs reachable from `job` in the
    /// consumer direction that currently exist on disk.
    fn output_mintime_downstream(&self, job: JobId) -> Option<std::time::SystemTime> {
        for j in self.bfs_rdeps([job], |_| false) {
            if let Some(t) = self.job(j).output_mintime() {
                return Some(t);
            }
        }
        None
    }

    /// Raise the priority of every job reachable upstream from a job whose
    /// rule is prioritised or whose output intersects `priorityfiles`,
    /// stopping at jobs that are already satisfied.
    pub fn update_priority(&mut self) {
        let prioritised: Vec<JobId> = self
            .needrun_jobs()
            .into_iter()
            .filter(|&j| {
                self.priorityrules.contains(&self.job(j).rule)
                    || self.job(j).output.iter().any(|f| self.priorityfiles.contains(f))
            })
            .collect();
        for job in self.bfs_deps(prioritised, |j| self.noneedrun_finished(j)) {
            self.jobs.get_mut(job).priority = crate::job::JobRecord::<R::File>::HIGHEST_PRIORITY;
        }
    }
}
