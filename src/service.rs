use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    eval::{AllocationDetails, AllocationResult, Allocator},
    experiment::Experiment,
    source::ExperimentSource,
    AssignmentEvent, Error, Result, ServiceConfig,
};

/// Headers every config response must carry: the snippet fetches configuration cross-origin from
/// the customer's site.
pub const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, OPTIONS"),
];

/// Config request sent by the snippet: `?pid=<project>&url=<page url>&uid=<visitor>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub pid: String,
    pub url: String,
    pub uid: String,
}

impl ConfigRequest {
    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// ```
    /// # use hypo::ConfigRequest;
    /// let request = ConfigRequest::from_query("pid=p-1&url=https%3A%2F%2Facme.ru%2F&uid=u_1").unwrap();
    /// assert_eq!(request.url, "https://acme.ru/");
    /// ```
    pub fn from_query(query: &str) -> Result<Self> {
        let mut request = ConfigRequest {
            pid: String::new(),
            url: String::new(),
            uid: String::new(),
        };
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*name {
                "pid" => request.pid = value.into_owned(),
                "url" => request.url = value.into_owned(),
                "uid" => request.uid = value.into_owned(),
                _ => {}
            }
        }
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.pid.is_empty() {
            return Err(Error::MissingParameter("pid"));
        }
        if self.url.is_empty() {
            return Err(Error::MissingParameter("url"));
        }
        if self.uid.is_empty() {
            return Err(Error::MissingParameter("uid"));
        }
        Ok(())
    }
}

/// Payload returned to the snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub experiments: Vec<ExperimentAssignment>,
}

/// Variant content to apply to one page element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentAssignment {
    /// Experiment id.
    pub id: String,
    pub selector: String,
    pub variant_id: String,
    pub content: String,
}

/// Assembles per-page configuration for visitors.
///
/// In order to create a service instance, first create [`ServiceConfig`].
///
/// # Examples
/// ```
/// # use hypo::{ConfigService, InMemoryExperimentSource, ServiceConfig};
/// let service = ServiceConfig::new().to_service(InMemoryExperimentSource::new());
/// ```
pub struct ConfigService<'a, S> {
    source: S,
    allocator: Allocator,
    config: ServiceConfig<'a>,
}

impl<'a, S: ExperimentSource> ConfigService<'a, S> {
    pub fn new(config: ServiceConfig<'a>, source: S) -> Self {
        ConfigService {
            source,
            allocator: Allocator::new(config.allocation_policy),
            config,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Allocate `visitor_id` to one of the experiment's variants, with diagnostics.
    pub fn explain(
        &self,
        visitor_id: &str,
        experiment: &Experiment,
    ) -> Result<AllocationDetails> {
        self.allocator
            .allocate_with_details(visitor_id, &experiment.id, &experiment.variants)
    }

    /// Resolve the experiments active for the requested page and the variant the visitor is
    /// assigned to in each.
    ///
    /// Experiments with an unusable variant set are left out of the response. Source errors fail
    /// the whole request.
    pub fn get_config(&self, request: &ConfigRequest) -> Result<ConfigResponse> {
        request.validate()?;

        let experiments = self
            .source
            .active_experiments(&request.pid, &request.url)
            .map_err(|err| {
                log::warn!(target: "hypo",
                           project_id:display = request.pid,
                           url:display = request.url;
                           "error occurred while fetching experiments: {:?}", err);
                err
            })?;

        let mut response = ConfigResponse::default();
        for experiment in &experiments {
            let allocation = self
                .allocator
                .allocate(&request.uid, &experiment.id, &experiment.variants);
            let result = match allocation {
                Ok(result) => result,
                Err(err) => {
                    log::warn!(target: "hypo",
                               project_id:display = request.pid,
                               experiment_id:display = experiment.id;
                               "skipping experiment: {}", err);
                    continue;
                }
            };

            let Some(assignment) = self.to_assignment(experiment, &result) else {
                continue;
            };

            log::trace!(target: "hypo",
                        project_id:display = request.pid,
                        experiment_id:display = experiment.id,
                        visitor_id:display = request.uid,
                        allocation:serde = result;
                        "allocated visitor");

            self.config.assignment_logger.log_assignment(AssignmentEvent {
                project_id: request.pid.clone(),
                experiment_id: experiment.id.clone(),
                variant_id: result.variant_id,
                visitor_id: request.uid.clone(),
                is_control: result.is_control,
                bucket_value: result.bucket_value,
                timestamp: Utc::now().to_rfc3339(),
                meta_data: HashMap::from([
                    ("sdkLanguage".to_owned(), "rust".to_owned()),
                    (
                        "sdkVersion".to_owned(),
                        env!("CARGO_PKG_VERSION").to_owned(),
                    ),
                ]),
            });

            response.experiments.push(assignment);
        }

        Ok(response)
    }

    fn to_assignment(
        &self,
        experiment: &Experiment,
        result: &AllocationResult,
    ) -> Option<ExperimentAssignment> {
        let Some(variant) = experiment.variant(&result.variant_id) else {
            log::warn!(target: "hypo",
                       experiment_id:display = experiment.id,
                       variant_id:display = result.variant_id;
                       "internal: unable to find variant");
            return None;
        };

        // An empty control would blank the element, serve the original text instead.
        let content = if variant.content.is_empty() {
            experiment.original_text.clone()
        } else {
            variant.content.clone()
        };

        Some(ExperimentAssignment {
            id: experiment.id.clone(),
            selector: experiment.selector.clone(),
            variant_id: variant.id.clone(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{
        eval::{AllocationPolicy, Resolution},
        experiment::{ElementType, Experiment, ExperimentStatus, Variant},
        service::{ConfigRequest, ConfigResponse, ExperimentAssignment, CORS_HEADERS},
        source::{ExperimentSource, InMemoryExperimentSource},
        AssignmentEvent, Error, Result, ServiceConfig,
    };

    fn hero_experiment(variants: Vec<Variant>) -> Experiment {
        Experiment {
            id: "exp_abc99".to_owned(),
            project_id: "p-1".to_owned(),
            name: "Hero headline".to_owned(),
            url_pattern: "/".to_owned(),
            selector: "h1.hero-title".to_owned(),
            element_type: ElementType::Headline,
            original_text: "Original headline".to_owned(),
            status: ExperimentStatus::Running,
            variants,
            start_date: None,
            stats: None,
        }
    }

    fn request(uid: &str) -> ConfigRequest {
        ConfigRequest {
            pid: "p-1".to_owned(),
            url: "https://acme-saas.ru/".to_owned(),
            uid: uid.to_owned(),
        }
    }

    fn source_with(experiments: Vec<Experiment>) -> InMemoryExperimentSource {
        let source = InMemoryExperimentSource::new();
        source.set_project_experiments("p-1", experiments);
        source
    }

    #[test]
    fn serves_allocated_variant() {
        let source = source_with(vec![hero_experiment(vec![
            Variant::new("v_control", true, 50).with_content("Original headline"),
            Variant::new("v_challenger", false, 50).with_content("Automate SEO"),
        ])]);
        let service = ServiceConfig::new().to_service(source);

        let response = service.get_config(&request("user_12345")).unwrap();
        assert_eq!(
            response,
            ConfigResponse {
                experiments: vec![ExperimentAssignment {
                    id: "exp_abc99".to_owned(),
                    selector: "h1.hero-title".to_owned(),
                    variant_id: "v_challenger".to_owned(),
                    content: "Automate SEO".to_owned(),
                }],
            }
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "experiments": [{
                    "id": "exp_abc99",
                    "selector": "h1.hero-title",
                    "variantId": "v_challenger",
                    "content": "Automate SEO",
                }]
            })
        );
    }

    #[test]
    fn empty_control_content_falls_back_to_original_text() {
        let source = source_with(vec![hero_experiment(vec![Variant::new("only", true, 100)])]);
        let service = ServiceConfig::new().to_service(source);

        let response = service.get_config(&request("user_12345")).unwrap();
        assert_eq!(response.experiments[0].variant_id, "only");
        assert_eq!(response.experiments[0].content, "Original headline");
    }

    #[test]
    fn omits_experiments_without_variants() {
        let mut broken = hero_experiment(vec![]);
        broken.id = "broken".to_owned();
        let source = source_with(vec![
            broken,
            hero_experiment(vec![
                Variant::new("a", true, 50),
                Variant::new("b", false, 50),
            ]),
        ]);
        let service = ServiceConfig::new().to_service(source);

        let response = service.get_config(&request("user_12345")).unwrap();
        let ids: Vec<&str> = response.experiments.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["exp_abc99"]);
    }

    #[test]
    fn logs_served_assignments() {
        let events = Arc::new(Mutex::new(Vec::<AssignmentEvent>::new()));
        let source = source_with(vec![hero_experiment(vec![
            Variant::new("v_control", true, 50),
            Variant::new("v_challenger", false, 50),
        ])]);

        let mut config = ServiceConfig::new();
        {
            let events = events.clone();
            config.assignment_logger(move |event: AssignmentEvent| {
                events.lock().unwrap().push(event)
            });
        }
        let service = config.to_service(source);
        service.get_config(&request("user_12345")).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].experiment_id, "exp_abc99");
        assert_eq!(events[0].variant_id, "v_challenger");
        assert_eq!(events[0].visitor_id, "user_12345");
        assert_eq!(events[0].bucket_value, 86);
        assert!(!events[0].is_control);
    }

    #[test]
    fn weighted_policy_is_applied() {
        let source = source_with(vec![hero_experiment(vec![
            Variant::new("v_control", true, 90),
            Variant::new("v_challenger", false, 10),
        ])]);
        let mut config = ServiceConfig::new();
        config.allocation_policy(AllocationPolicy::Weighted);
        let service = config.to_service(source);

        // bucket 86 is inside the control's 0..90 range.
        let response = service.get_config(&request("user_12345")).unwrap();
        assert_eq!(response.experiments[0].variant_id, "v_control");

        let experiments = service
            .source()
            .active_experiments("p-1", "https://acme-saas.ru/")
            .unwrap();
        let details = service.explain("user_12345", &experiments[0]).unwrap();
        assert_eq!(details.resolution, Resolution::WeightedRange { start: 0, end: 90 });
    }

    #[test]
    fn missing_parameters() {
        let service = ServiceConfig::new().to_service(InMemoryExperimentSource::new());
        let mut req = request("");
        assert!(matches!(
            service.get_config(&req),
            Err(Error::MissingParameter("uid"))
        ));
        req.pid = String::new();
        assert!(matches!(
            service.get_config(&req),
            Err(Error::MissingParameter("pid"))
        ));

        assert!(matches!(
            ConfigRequest::from_query("pid=p-1&uid=u_1"),
            Err(Error::MissingParameter("url"))
        ));
    }

    #[test]
    fn parses_snippet_query() {
        let req = ConfigRequest::from_query(
            "pid=p-1&url=https%3A%2F%2Facme-saas.ru%2Fpricing%3Fref%3Dads&uid=u_k3j9x0a1b",
        )
        .unwrap();
        assert_eq!(req.pid, "p-1");
        assert_eq!(req.url, "https://acme-saas.ru/pricing?ref=ads");
        assert_eq!(req.uid, "u_k3j9x0a1b");
    }

    struct UnavailableSource;

    impl ExperimentSource for UnavailableSource {
        fn active_experiments(&self, _project_id: &str, _url: &str) -> Result<Vec<Experiment>> {
            Err(Error::ServiceUnavailable)
        }
    }

    #[test]
    fn source_failure_fails_the_request() {
        let service = ServiceConfig::new().to_service(UnavailableSource);
        assert!(matches!(
            service.get_config(&request("u_1")),
            Err(Error::ServiceUnavailable)
        ));
    }

    #[test]
    fn unknown_project() {
        let service = ServiceConfig::new().to_service(InMemoryExperimentSource::new());
        assert!(matches!(
            service.get_config(&request("u_1")),
            Err(Error::ProjectNotFound)
        ));
    }

    #[test]
    fn responses_allow_any_origin() {
        assert!(CORS_HEADERS.contains(&("Access-Control-Allow-Origin", "*")));
        assert!(CORS_HEADERS.contains(&("Access-Control-Allow-Methods", "GET, OPTIONS")));
    }
}
