use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockWriteGuard},
};

use regex::Regex;

use crate::{experiment::Experiment, Error, Result};

/// A store of experiment records.
///
/// Implementations return the experiments of a project that are active for a page URL, or fail
/// with [`Error::ServiceUnavailable`] when the backing store cannot be reached.
pub trait ExperimentSource {
    fn active_experiments(&self, project_id: &str, url: &str) -> Result<Vec<Experiment>>;
}

impl<T: ExperimentSource + ?Sized> ExperimentSource for Arc<T> {
    fn active_experiments(&self, project_id: &str, url: &str) -> Result<Vec<Experiment>> {
        (**self).active_experiments(project_id, url)
    }
}

/// Return `true` if `url` matches the experiment's `urlPattern` regex (unanchored).
///
/// An invalid pattern never matches.
pub fn matches_url(url_pattern: &str, url: &str) -> bool {
    match Regex::new(url_pattern) {
        Ok(regex) => regex.is_match(url),
        Err(err) => {
            log::warn!(target: "hypo",
                       url_pattern:display = url_pattern,
                       error:display = err;
                       "invalid experiment url pattern");
            false
        }
    }
}

/// Keep experiments that are running and whose url pattern matches `url`.
pub fn filter_active(
    experiments: impl IntoIterator<Item = Experiment>,
    url: &str,
) -> Vec<Experiment> {
    experiments
        .into_iter()
        .filter(|experiment| experiment.is_running() && matches_url(&experiment.url_pattern, url))
        .collect()
}

type ProjectMap = HashMap<String, Arc<Vec<Experiment>>>;

/// `InMemoryExperimentSource` keeps experiment lists per project in process memory, allowing
/// concurrent access for readers and writers.
#[derive(Default)]
pub struct InMemoryExperimentSource {
    projects: RwLock<ProjectMap>,
}

impl InMemoryExperimentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the experiments of a project, returning the previous list.
    pub fn set_project_experiments(
        &self,
        project_id: impl Into<String>,
        experiments: Vec<Experiment>,
    ) -> Option<Arc<Vec<Experiment>>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(experiments);

        let mut projects = self.write_projects()?;
        projects.insert(project_id.into(), new_value)
    }

    pub fn remove_project(&self, project_id: &str) -> Option<Arc<Vec<Experiment>>> {
        self.write_projects()?.remove(project_id)
    }

    /// `None` if the lock is poisoned. The write is dropped then, which is logged since callers
    /// cannot tell it from a first insert.
    fn write_projects(&self) -> Option<RwLockWriteGuard<'_, ProjectMap>> {
        match self.projects.write() {
            Ok(projects) => Some(projects),
            Err(_) => {
                log::warn!(target: "hypo", "experiment store lock is poisoned, dropping write");
                None
            }
        }
    }

    pub fn project_experiments(&self, project_id: &str) -> Option<Arc<Vec<Experiment>>> {
        // Err() is possible only if the lock is poisoned (writer panicked while holding the lock).
        // Using .ok()? here to not crash the app.
        let projects = self.projects.read().ok()?;
        projects.get(project_id).cloned()
    }
}

impl ExperimentSource for InMemoryExperimentSource {
    fn active_experiments(&self, project_id: &str, url: &str) -> Result<Vec<Experiment>> {
        let experiments = self
            .project_experiments(project_id)
            .ok_or(Error::ProjectNotFound)?;
        Ok(filter_active(experiments.iter().cloned(), url))
    }
}
