use crate::{error::DagError, file::IoFile, graph::Dag, job::JobId, persistence::Persistence, rule::Rule};
use tracing::debug;

impl<R: Rule, P: Persistence> Dag<R, P>
where
    R::File: IoFile,
{
    /// Re-expand a job whose dynamic output wildcards are only discoverable
    /// now that it has run: glob the produced files, split the job into one
    /// concrete branch per discovered binding, and rewire every consumer
    /// that was waiting on the dynamic output onto its matching branch.
    ///
    /// A no-op if the rule-language collaborator reports no dynamic wildcard
    /// bindings (nothing new was produced).
    pub fn update_dynamic(&mut self, job: JobId) -> Result<(), DagError> {
        let rule_id = self.job(job).rule;
        let base_wildcards = self.job(job).wildcards.clone();
        let discovered = self.rule(rule_id).discover_dynamic_wildcards(&base_wildcards);
        if discovered.is_empty() {
            return Ok(());
        }
        debug!(?job, count = discovered.len(), "expanding dynamic output");

        let was_target = self.targetjobs.contains(&job);
        let depending: Vec<JobId> = self
            .bfs_rdeps([job], |j| self.noneedrun_finished(j))
            .into_iter()
            .filter(|&j| j != job)
            .collect();

        let mut branches = Vec::with_capacity(discovered.len());
        for dynamic_wildcards in &discovered {
            let (branch_rule, non_dynamic_wildcards) =
                self.rule(rule_id).dynamic_branch_output(dynamic_wildcards);
            let branch_rule_id = self.replace_rule(rule_id, branch_rule);

            let mut wildcards = base_wildcards.clone();
            wildcards.extend(non_dynamic_wildcards);
            wildcards.extend(dynamic_wildcards.clone());

            let branch_job = self.jobs.intern(&self.rules, branch_rule_id, wildcards);
            self.finished.insert(branch_job);
            self.omitforce.insert(branch_job);
            if was_target {
                self.targetjobs.insert(branch_job);
            }
            branches.push((branch_job, dynamic_wildcards.clone()));
        }

        for consumer in depending {
            let consumer_rule_id = self.job(consumer).rule;
            for (branch_job, dynamic_wildcards) in &branches {
                let Some(branched_rule) = self.rule(consumer_rule_id).dynamic_branch_input(dynamic_wildcards)
                else {
                    continue;
                };
                let new_consumer_rule_id = self.replace_rule(consumer_rule_id, branched_rule);
                let mut wildcards = self.job(consumer).wildcards.clone();
                wildcards.extend(dynamic_wildcards.clone());
                let new_consumer = self.jobs.intern(&self.rules, new_consumer_rule_id, wildcards);
                self.replace_job(consumer, new_consumer)?;
                let branch_output: Vec<R::File> = self.job(*branch_job).output.clone();
                self.deps
                    .entry(new_consumer)
                    .or_default()
                    .entry(*branch_job)
                    .or_default()
                    .extend(branch_output.iter().cloned());
                self.rdeps
                    .entry(*branch_job)
                    .or_default()
                    .entry(new_consumer)
                    .or_default()
                    .extend(branch_output);
            }
        }

        if was_target {
            self.targetjobs.shift_remove(&job);
        }
        self.delete_job(job, false);

        Ok(())
    }
}
