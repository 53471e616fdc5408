use crate::common::{JobId, Map};

/// Number of nodes still required by the jobs known to the scheduler, maintained from job and
/// task events.
#[derive(Default, Debug)]
pub struct WorkloadTracker {
    jobs: Map<JobId, u32>,
}

impl WorkloadTracker {
    /// Starts tracking the jobs that were submitted before the policy was activated.
    pub fn seed(&mut self, jobs: Map<JobId, u32>) {
        log::debug!("Seeding workload with {} job(s)", jobs.len());
        for (job, nodes_needed) in &jobs {
            self.on_job_submitted(*job, *nodes_needed);
        }
    }

    pub fn on_job_submitted(&mut self, job: JobId, nodes_needed: u32) {
        let needed = self.jobs.entry(job).or_default();
        *needed = needed.saturating_add(nodes_needed);
    }

    pub fn on_task_finished(&mut self, job: JobId, nodes: u32) {
        match self.jobs.get_mut(&job) {
            Some(needed) => {
                if *needed < nodes {
                    log::warn!(
                        "Job {job} finished a task with {nodes} node(s), but only {needed} were needed"
                    );
                }
                *needed = needed.saturating_sub(nodes);
            }
            None => log::debug!("Task of an unknown job {job} has finished"),
        }
    }

    /// The demand of a job was recomputed by the scheduler, e.g. after its tasks were replicated
    /// or skipped.
    pub fn on_job_updated(&mut self, job: JobId, nodes_needed: u32) {
        match self.jobs.get_mut(&job) {
            Some(needed) => *needed = nodes_needed,
            None => log::debug!("Unknown job {job} was updated"),
        }
    }

    pub fn on_job_finished(&mut self, job: JobId) {
        if self.jobs.remove(&job).is_none() {
            log::debug!("Unknown job {job} has finished");
        }
    }

    pub fn nodes_needed(&self) -> u32 {
        self.jobs
            .values()
            .fold(0u32, |total, needed| total.saturating_add(*needed))
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}
