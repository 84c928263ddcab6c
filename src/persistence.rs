use crate::job::JobId;

/// The workflow's incompleteness tracker: reports whether a job's outputs
/// were left behind by a run that didn't finish (e.g. the process was
/// killed mid-job). An external collaborator; the DAG core only consults it
/// during `update_needrun`.
pub trait Persistence {
    fn incomplete(&self, job: JobId) -> bool;
}

/// A [`Persistence`] that never reports incompleteness. Useful for tests and
/// for workflows that don't track partial runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverIncomplete;

impl Persistence for NeverIncomplete {
    fn incomplete(&self, _job: JobId) -> bool {
        false
    }
}
