mod config;
mod dot;
mod dynamic;
mod error;
mod file;
mod job;
mod needrun;
mod persistence;
mod ready;
mod resolver;
mod rule;
mod wildcards;

#[cfg(test)]
mod tests;

pub mod graph;

pub use crate::{
    config::DagConfig,
    error::DagError,
    file::IoFile,
    graph::Dag,
    job::{JobId, JobRecord, RuleId},
    needrun::Reason,
    persistence::{NeverIncomplete, Persistence},
    rule::Rule,
    wildcards::Wildcards,
};

use tracing::info;

impl<R: Rule, P: Persistence> Dag<R, P>
where
    R::File: IoFile,
{
    /// Resolve every target rule and target file into the graph, aggregate
    /// unresolvable target files into a single [`DagError::Combined`], then
    /// run an initial needrun/priority/ready pass.
    ///
    /// Jobs whose dynamic output was already satisfied by a prior run (e.g.
    /// resuming an interrupted build) are re-expanded via `update_dynamic`
    /// before `postprocess`, so the ready frontier never exposes a job this
    /// process considers half-resolved.
    pub fn init(&mut self) -> Result<(), DagError> {
        for &rule in self.targetrules.clone().iter() {
            let job = self.rule_to_job(rule);
            let job = self.update(&[job], None)?;
            self.targetjobs.insert(job);
        }

        let targetfiles = self.targetfiles.clone();
        let mut failures = Vec::new();
        for file in &targetfiles {
            match self.file_to_jobs(file) {
                Ok(candidates) => match self.update(&candidates, Some(file)) {
                    Ok(job) => {
                        self.targetjobs.insert(job);
                    }
                    Err(e @ DagError::MissingRule { .. }) => failures.push((file.to_string(), e)),
                    Err(e) => return Err(e),
                },
                Err(e @ DagError::MissingRule { .. }) => failures.push((file.to_string(), e)),
                Err(e) => return Err(e),
            }
        }
        if !failures.is_empty() {
            return Err(DagError::Combined(failures));
        }

        self.update_needrun();

        let already_dynamic: Vec<JobId> = self
            .jobs()
            .into_iter()
            .filter(|&j| !self.job(j).dynamic_output.is_empty() && self.noneedrun_finished(j))
            .collect();
        for job in already_dynamic {
            self.update_dynamic(job)?;
        }

        self.postprocess();
        info!(jobs = self.len(), "dag initialised");
        Ok(())
    }
}
