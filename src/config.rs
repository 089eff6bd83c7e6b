use crate::{
    assignment_logger::NoopAssignmentLogger, eval::AllocationPolicy,
    rest_source::RestExperimentSource, source::ExperimentSource, AssignmentLogger, ConfigService,
    Error, Result,
};

/// Configuration for [`ConfigService`].
pub struct ServiceConfig<'a> {
    pub(crate) allocation_policy: AllocationPolicy,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync + 'a>,
}

impl<'a> ServiceConfig<'a> {
    /// Create a configuration using the binary-threshold policy and no assignment logging.
    pub fn new() -> Self {
        ServiceConfig {
            allocation_policy: AllocationPolicy::default(),
            assignment_logger: Box::new(NoopAssignmentLogger),
        }
    }

    /// Set how buckets are mapped to variants.
    ///
    /// ```
    /// # use hypo::{AllocationPolicy, ServiceConfig};
    /// let mut config = ServiceConfig::new();
    /// config.allocation_policy(AllocationPolicy::Weighted);
    /// ```
    pub fn allocation_policy(&mut self, allocation_policy: AllocationPolicy) -> &mut Self {
        self.allocation_policy = allocation_policy;
        self
    }

    /// Set assignment logger to pass served assignments to your data warehouse.
    ///
    /// ```
    /// # use hypo::{AssignmentEvent, ServiceConfig};
    /// let mut config = ServiceConfig::new();
    /// config.assignment_logger(|event: AssignmentEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn assignment_logger(
        &mut self,
        assignment_logger: impl AssignmentLogger + Send + Sync + 'a,
    ) -> &mut Self {
        self.assignment_logger = Box::new(assignment_logger);
        self
    }

    /// Create a new [`ConfigService`] reading experiments from `source`.
    pub fn to_service<S: ExperimentSource>(self, source: S) -> ConfigService<'a, S> {
        ConfigService::new(self, source)
    }
}

impl Default for ServiceConfig<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection settings for the hosted experiment datastore.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) table: String,
}

impl SourceConfig {
    /// Environment variable holding the datastore URL.
    pub const URL_ENV: &'static str = "SUPABASE_URL";
    /// Environment variable holding the anonymous API key.
    pub const API_KEY_ENV: &'static str = "SUPABASE_ANON_KEY";
    /// Table experiments are read from.
    pub const DEFAULT_TABLE: &'static str = "experiments";

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        SourceConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: Self::DEFAULT_TABLE.to_owned(),
        }
    }

    /// Read settings from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// Fails with [`Error::NotConfigured`] if either is missing or still holds the placeholder from
    /// the project template.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(Self::URL_ENV).ok(),
            std::env::var(Self::API_KEY_ENV).ok(),
        )
    }

    fn from_vars(base_url: Option<String>, api_key: Option<String>) -> Result<Self> {
        let config = Self::new(base_url.unwrap_or_default(), api_key.unwrap_or_default());
        if config.is_configured() {
            Ok(config)
        } else {
            log::warn!(target: "hypo", "experiment datastore is not configured");
            Err(Error::NotConfigured)
        }
    }

    /// Return `false` for empty or placeholder settings.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
            && !self.api_key.is_empty()
            && !self.base_url.contains("your-project-url")
            && !self.api_key.contains("your-anon-key")
    }

    /// Override the table experiments are read from.
    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = table.into();
        self
    }

    /// Create a [`RestExperimentSource`] using these settings.
    pub fn to_source(self) -> Result<RestExperimentSource> {
        RestExperimentSource::new(self)
    }
}
