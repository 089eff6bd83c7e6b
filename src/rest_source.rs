//! An HTTP client that reads experiments from the hosted datastore's REST interface.
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{StatusCode, Url};

use crate::{
    config::SourceConfig,
    experiment::{Experiment, TryParse},
    source::{filter_active, ExperimentSource},
    Error, Result,
};

const REST_PREFIX: &str = "/rest/v1/";

/// [`ExperimentSource`] backed by the hosted datastore.
///
/// Use [`SourceConfig::to_source`] to get an instance of it.
pub struct RestExperimentSource {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    endpoint: Url,
    api_key: String,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: AtomicBool,
}

impl RestExperimentSource {
    pub(crate) fn new(config: SourceConfig) -> Result<RestExperimentSource> {
        let endpoint = Url::parse(&format!(
            "{}{}{}",
            config.base_url.trim_end_matches('/'),
            REST_PREFIX,
            config.table
        ))
        .map_err(Error::InvalidBaseUrl)?;

        Ok(RestExperimentSource {
            client: reqwest::blocking::Client::new(),
            endpoint,
            api_key: config.api_key,
            unauthorized: AtomicBool::new(false),
        })
    }

    fn project_url(&self, project_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("project_id", &format!("eq.{}", project_id));
        url
    }

    fn fetch_project(&self, project_id: &str) -> Result<Vec<u8>> {
        if self.unauthorized.load(Ordering::Relaxed) {
            return Err(Error::Unauthorized);
        }

        log::debug!(target: "hypo", project_id:display = project_id; "fetching experiments");
        let response = self
            .client
            .get(self.project_url(project_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|err| {
                log::warn!(target: "hypo", "error while fetching experiments: {:?}", err);
                Error::ServiceUnavailable
            })?;

        self.check_status(response.status())?;

        let body = response.bytes().map_err(|err| {
            log::warn!(target: "hypo", "failed to read experiments response body: {:?}", err);
            Error::ServiceUnavailable
        })?;
        Ok(body.to_vec())
    }

    fn check_status(&self, status: StatusCode) -> Result<()> {
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => {
                log::warn!(target: "hypo",
                           "experiment source is not authorized. Check your API key");
                self.unauthorized.store(true, Ordering::Relaxed);
                Err(Error::Unauthorized)
            }
            code => {
                log::warn!(target: "hypo",
                           "received non-200 response while fetching experiments: {:?}", code);
                Err(Error::ServiceUnavailable)
            }
        }
    }
}

/// Parse a datastore response, skipping records that fail to parse.
fn parse_experiments(body: &[u8]) -> Result<Vec<Experiment>> {
    let records: Vec<TryParse<Experiment>> = serde_json::from_slice(body).map_err(|err| {
        log::warn!(target: "hypo", "failed to parse experiments response body: {:?}", err);
        Error::ServiceUnavailable
    })?;

    Ok(records
        .into_iter()
        .filter_map(|record| match record {
            TryParse::Parsed(experiment) => Some(experiment),
            TryParse::ParseFailed(value) => {
                log::warn!(target: "hypo",
                           record:serde = value;
                           "skipping experiment record that failed to parse");
                None
            }
        })
        .collect())
}

impl ExperimentSource for RestExperimentSource {
    fn active_experiments(&self, project_id: &str, url: &str) -> Result<Vec<Experiment>> {
        let experiments = parse_experiments(&self.fetch_project(project_id)?)?;
        log::debug!(target: "hypo",
                    project_id:display = project_id,
                    count = experiments.len();
                    "fetched experiments");
        Ok(filter_active(experiments, url))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{
        config::SourceConfig,
        experiment::{ElementType, ExperimentStatus},
        rest_source::parse_experiments,
        source::ExperimentSource,
        Error,
    };

    #[test]
    fn builds_project_url() {
        let source = SourceConfig::new("https://abc.supabase.co/", "key")
            .to_source()
            .unwrap();
        assert_eq!(
            source.project_url("p-1").as_str(),
            "https://abc.supabase.co/rest/v1/experiments?select=*&project_id=eq.p-1"
        );
    }

    #[test]
    fn invalid_base_url() {
        assert!(matches!(
            SourceConfig::new("not a url", "key").to_source(),
            Err(Error::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn parses_table_rows() {
        let experiments = parse_experiments(
            br#"[
                {
                  "id": "exp-101",
                  "project_id": "p-1",
                  "name": "Hero headline",
                  "url_pattern": "/",
                  "selector": "h1.hero-title",
                  "element_type": "SUBHEAD",
                  "original_text": "The best SEO tool",
                  "status": "RUNNING",
                  "start_date": "2023-10-15",
                  "created_at": "2023-10-14T09:00:00+00:00",
                  "variants": [
                    {"id": "v-a", "content": "The best SEO tool", "is_control": true, "traffic_split": 50},
                    {"id": "v-b", "content": "Grow faster", "is_control": false, "traffic_split": 50}
                  ],
                  "stats": {"visitors": 10, "conversions": 1, "composite_score": 4.8, "confidence": 0.9}
                }
            ]"#,
        )
        .unwrap();
        assert_eq!(experiments.len(), 1);
        let experiment = &experiments[0];
        assert_eq!(experiment.project_id, "p-1");
        assert_eq!(experiment.url_pattern, "/");
        assert_eq!(experiment.element_type, ElementType::Subhead);
        assert_eq!(experiment.original_text, "The best SEO tool");
        assert_eq!(experiment.status, ExperimentStatus::Running);
        assert!(experiment.variants[0].is_control);
        assert_eq!(experiment.variants[1].traffic_split, 50);
        assert_eq!(experiment.stats.map(|s| s.composite_score), Some(4.8));
    }

    #[test]
    fn skips_unparseable_records() {
        let experiments = parse_experiments(
            br#"[
                {"id":"ok","project_id":"p-1","url_pattern":"/","selector":"h1","status":"RUNNING","variants":[]},
                {"id":"broken","project_id":"p-1"}
            ]"#,
        )
        .unwrap();
        assert_eq!(experiments.len(), 1);
        assert_eq!(experiments[0].id, "ok");
    }

    #[test]
    fn malformed_body_is_unavailable() {
        assert!(matches!(
            parse_experiments(b"<html>bad gateway</html>"),
            Err(Error::ServiceUnavailable)
        ));
    }

    #[test]
    fn unauthorized_is_sticky() {
        let source = SourceConfig::new("https://abc.supabase.co", "bad-key")
            .to_source()
            .unwrap();
        assert!(matches!(
            source.check_status(StatusCode::UNAUTHORIZED),
            Err(Error::Unauthorized)
        ));
        // Answered from the cached flag, no request is sent.
        assert!(matches!(
            source.active_experiments("p-1", "https://acme-saas.ru/"),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn other_statuses_are_unavailable() {
        let source = SourceConfig::new("https://abc.supabase.co", "key")
            .to_source()
            .unwrap();
        assert!(source.check_status(StatusCode::OK).is_ok());
        for status in [
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(
                source.check_status(status),
                Err(Error::ServiceUnavailable)
            ));
        }
        // A non-401 failure does not poison later requests.
        assert!(!source.unauthorized.load(std::sync::atomic::Ordering::Relaxed));
    }
}
