use crate::{error::DagError, file::IoFile, graph::Dag, job::JobId, persistence::Persistence, rule::Rule};
use std::time::Duration;
use tracing::{debug, warn};

impl<R: Rule, P: Persistence> Dag<R, P> {
    /// Recompute the ready frontier: every `needrun` job, not yet finished,
    /// all of whose producers are themselves `noneedrun_finished`.
    pub fn update_ready(&mut self) {
        let candidates: Vec<JobId> = self.needrun_jobs();
        self.ready.clear();
        for job in candidates {
            if self.is_ready(job) {
                self.ready.insert(job);
            }
        }
    }

    fn is_ready(&self, job: JobId) -> bool {
        if self.finished(job) {
            return false;
        }
        self.deps
            .get(&job)
            .map(|producers| producers.keys().all(|&p| self.noneedrun_finished(p)))
            .unwrap_or(true)
    }

    /// A single recomputation pass: needrun analysis, priority propagation,
    /// then the ready frontier. Idempotent absent intervening state changes.
    pub fn postprocess(&mut self) {
        self.update_needrun();
        self.update_priority();
        self.update_ready();
    }

    /// Record that `job` has completed execution. Checks for dynamic
    /// re-expansion unless `update_dynamic` is false, and refreshes the
    /// ready frontier. Protecting outputs and releasing temp files are the
    /// executor's call — see `handle_protected`/`handle_temp`.
    pub fn finish(&mut self, job: JobId, update_dynamic: bool) -> Result<(), DagError>
    where
        R::File: IoFile,
    {
        self.finished.insert(job);
        self.ready.shift_remove(&job);

        if update_dynamic && !self.job(job).dynamic_output.is_empty() {
            self.update_dynamic(job)?;
            self.postprocess();
        } else {
            self.update_ready();
        }
        Ok(())
    }

    /// Protect `job`'s protected outputs against accidental overwrite.
    pub fn handle_protected(&self, job: JobId)
    where
        R::File: IoFile,
    {
        for file in &self.job(job).protected_output {
            if let Err(e) = file.protect() {
                warn!(%file, error = %e, "failed to protect output");
            }
        }
    }

    /// Remove `job`'s temp outputs once every consumer that still needs
    /// them has finished (or will never run).
    pub fn handle_temp(&mut self, job: JobId)
    where
        R::File: IoFile,
    {
        if self.job(job).temp_output.is_empty() {
            return;
        }
        let all_consumers_done = self
            .rdeps
            .get(&job)
            .map(|m| m.keys().all(|&c| self.noneedrun_finished(c)))
            .unwrap_or(true);
        if !all_consumers_done {
            return;
        }
        let temp_files = self.job(job).temp_output.clone();
        for file in temp_files {
            if file.exists() {
                debug!(%file, "removing temp output");
                if let Err(e) = file.remove() {
                    warn!(%file, error = %e, "failed to remove temp output");
                }
            }
        }
    }

    /// `job`'s temp outputs that are gone but still required by one of its
    /// consumers that hasn't run yet. Walking consumers (`rdeps`) rather
    /// than producers catches the case where a temp file was requested by
    /// more than one downstream job and an earlier `finish` already swept
    /// it away on behalf of one of them.
    pub fn missing_temp(&self, job: JobId) -> Vec<R::File>
    where
        R::File: IoFile,
    {
        if self.job(job).temp_output.is_empty() {
            return Vec::new();
        }
        let needed = self
            .rdeps
            .get(&job)
            .map(|consumers| consumers.keys().any(|&c| self.needrun(c) && !self.finished(c)))
            .unwrap_or(false);
        if !needed {
            return Vec::new();
        }
        self.job(job)
            .temp_output
            .iter()
            .filter(|file| !file.exists())
            .cloned()
            .collect()
    }

    /// Verify that every non-temp output of `job` now exists, retrying up to
    /// `wait` to tolerate slow or eventually-consistent filesystems.
    pub fn check_output(&self, job: JobId, wait: Duration) -> Result<(), DagError>
    where
        R::File: IoFile,
    {
        let record = self.job(job);
        let deadline = std::time::Instant::now() + wait;
        for file in &record.output {
            while !file.exists() {
                if std::time::Instant::now() >= deadline {
                    return Err(DagError::MissingOutput {
                        rule: self.rule(record.rule).name().to_owned(),
                        file: file.to_string(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        Ok(())
    }
}
