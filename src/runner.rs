//! Runs a scenario file through given/when/then chains.

use crate::dispatch::Overrides;
use crate::error::{Error, Result};
use crate::expect::{JsonSchema, Then};
use crate::given::given;
use crate::scenario::{Expectations, Scenario, ScenarioFile};
use crate::transport::{ReqwestTransport, Transport};
use tracing::{info, warn};

/// Result of one scenario.
#[derive(Debug)]
pub struct Outcome {
    pub name: String,
    pub error: Option<Error>,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of a whole run, in scenario order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Run every scenario over HTTP.
pub fn run(file: &ScenarioFile) -> RunSummary {
    run_with(file, ReqwestTransport::new)
}

/// Run every scenario, opening a fresh transport for each.
///
/// A failing scenario is recorded and the run continues.
pub fn run_with<T, F>(file: &ScenarioFile, mut transport: F) -> RunSummary
where
    T: Transport,
    F: FnMut() -> T,
{
    let mut summary = RunSummary::default();

    for scenario in &file.scenarios {
        let error = run_scenario(file, scenario, transport()).err();
        match &error {
            None => info!(scenario = %scenario.name, "Scenario passed"),
            Some(e) => warn!(scenario = %scenario.name, error = %e, "Scenario failed"),
        }
        summary.outcomes.push(Outcome {
            name: scenario.name.clone(),
            error,
        });
    }

    info!(
        passed = summary.passed(),
        failed = summary.failed(),
        "Run finished"
    );
    summary
}

fn run_scenario<T: Transport>(file: &ScenarioFile, scenario: &Scenario, transport: T) -> Result<()> {
    let overrides = scenario
        .request
        .options
        .iter()
        .fold(Overrides::new(), |overrides, (key, value)| {
            overrides.option(key.as_str(), value.clone())
        });

    let mut when = given(file.base_url.as_deref())
        .extend_options(file.options.clone())?
        .when_with(transport)?;
    when.request(scenario.request.method, &scenario.request.endpoint, overrides)?;

    let result = check(&when.then()?, &scenario.expect);
    when.close();
    result
}

fn check(then: &Then<'_>, expect: &Expectations) -> Result<()> {
    if let Some(status) = expect.status {
        then.status(status)?;
    }
    if expect.status_ok {
        then.status_ok()?;
    }
    if let Some(content_type) = &expect.header_content_type {
        then.header_content_type(content_type)?;
    }
    for (name, value) in &expect.headers {
        then.header(name, value)?;
    }
    if let Some(body) = &expect.body {
        then.body_equals(body)?;
    }
    if let Some(substring) = &expect.body_contains {
        then.body_contains(substring)?;
    }
    if let Some(json) = &expect.json {
        then.json_equals(json.clone())?;
    }
    if let Some(subset) = &expect.json_contains {
        then.json_contains(subset.clone())?;
    }
    for key in &expect.has_key {
        then.has_key(key)?;
    }
    for (expr, value) in &expect.json_path {
        then.json_path(expr, value.clone())?;
    }
    if let Some(document) = &expect.json_schema {
        then.json_schema(&JsonSchema::new(document.clone())?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;

    const SCENARIOS: &str = r#"
base_url: http://x.test/api/
options:
  headers:
    Accept: application/json
scenarios:
  - name: list posts
    request:
      endpoint: posts
      options:
        params:
          userId: 1
    expect:
      status: 200
      status_ok: true
      header_content_type: application/json
      json_contains:
        userId: 1
      has_key: [id]
      json_path:
        "$.userId": 1
      json_schema:
        type: object
        required: [userId]
  - name: wrong status
    request:
      endpoint: /posts/1
    expect:
      status: 404
"#;

    #[test]
    fn test_run_records_each_outcome() {
        let file = ScenarioFile::from_yaml(SCENARIOS).unwrap();
        let summary = run_with(&file, || {
            StubTransport::responding(200, "application/json", r#"{"userId": 1, "id": 1}"#)
        });

        assert_eq!(summary.outcomes.len(), 2);
        assert!(summary.outcomes[0].passed());
        assert_eq!(summary.outcomes[1].name, "wrong status");
        assert!(summary.outcomes[1].error.as_ref().unwrap().is_mismatch());
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_transport_failure_is_recorded() {
        let file = ScenarioFile::from_yaml(SCENARIOS).unwrap();
        let summary = run_with(&file, StubTransport::refusing);
        assert_eq!(summary.failed(), 2);
        assert!(matches!(
            summary.outcomes[0].error,
            Some(Error::Transport { .. })
        ));
    }

    #[test]
    fn test_non_json_body_fails_json_checks() {
        let file = ScenarioFile::from_yaml(SCENARIOS).unwrap();
        let summary = run_with(&file, || StubTransport::responding(200, "application/json", "oops"));
        assert!(matches!(
            summary.outcomes[0].error,
            Some(Error::JsonParse(_))
        ));
    }
}
