//! Scenario files for the `rip` runner.
//!
//! A scenario file names a base URL, options shared by every scenario, and a
//! list of request/expectation pairs.

use crate::dispatch::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Base URL every endpoint is resolved against
    #[serde(default)]
    pub base_url: Option<String>,

    /// Options applied to every scenario before its own
    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    /// Scenarios, run in order
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl ScenarioFile {
    /// Load scenarios from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file = Self::from_yaml(&content)?;
        Ok(file)
    }

    /// Parse and validate scenarios from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let file: Self = serde_yaml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate the scenario file.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scenarios.is_empty() {
            anyhow::bail!("No scenarios defined");
        }
        for (i, scenario) in self.scenarios.iter().enumerate() {
            scenario
                .validate()
                .map_err(|e| anyhow::anyhow!("Scenario {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// One request and what its response must look like.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Name shown in logs and the run summary
    pub name: String,

    /// Request to send
    pub request: RequestStep,

    /// Expectations, checked in declaration order
    #[serde(default)]
    pub expect: Expectations,
}

impl Scenario {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Scenario name cannot be empty");
        }
        if self.request.endpoint.is_empty() {
            anyhow::bail!("Scenario '{}' has an empty endpoint", self.name);
        }
        let body_set = |key: &str| self.request.options.get(key).is_some_and(|v| !v.is_null());
        if body_set("data") && body_set("json") {
            anyhow::bail!("Scenario '{}' sets both 'data' and 'json'", self.name);
        }
        Ok(())
    }
}

/// The request half of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestStep {
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: Method,

    /// Endpoint, relative to the base URL or absolute
    pub endpoint: String,

    /// Per-call overrides
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

fn default_method() -> Method {
    Method::Get
}

/// Expected response properties. Unset fields are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectations {
    #[serde(default)]
    pub status: Option<u16>,

    /// Require a 2xx status
    #[serde(default)]
    pub status_ok: bool,

    #[serde(default)]
    pub header_content_type: Option<String>,

    /// Individual headers that must be present with these values
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub body_contains: Option<String>,

    /// Exact JSON body
    #[serde(default)]
    pub json: Option<Value>,

    #[serde(default)]
    pub json_contains: Option<Value>,

    #[serde(default)]
    pub has_key: Vec<String>,

    /// JSONPath expression → value every match must equal
    #[serde(default)]
    pub json_path: BTreeMap<String, Value>,

    /// JSON Schema document the body must satisfy
    #[serde(default)]
    pub json_schema: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_scenario() {
        let yaml = r#"
base_url: https://jsonplaceholder.typicode.com
scenarios:
  - name: first post
    request:
      endpoint: /posts/1
    expect:
      status: 200
"#;
        let file = ScenarioFile::from_yaml(yaml).unwrap();
        assert_eq!(file.base_url.as_deref(), Some("https://jsonplaceholder.typicode.com"));
        assert_eq!(file.scenarios.len(), 1);

        let scenario = &file.scenarios[0];
        assert_eq!(scenario.request.method, Method::Get);
        assert_eq!(scenario.expect.status, Some(200));
        assert!(!scenario.expect.status_ok);
        assert!(scenario.expect.json_path.is_empty());
    }

    #[test]
    fn test_parse_full_scenario() {
        let yaml = r#"
options:
  headers:
    Accept: application/json
scenarios:
  - name: create post
    request:
      method: POST
      endpoint: https://api.test/posts
      options:
        json:
          title: foo
          userId: 1
    expect:
      status: 201
      header_content_type: application/json; charset=utf-8
      headers:
        x-powered-by: Express
      json_contains:
        title: foo
      has_key: [id]
      json_path:
        "$.userId": 1
      json_schema:
        type: object
        required: [id]
"#;
        let file = ScenarioFile::from_yaml(yaml).unwrap();
        assert_eq!(file.options["headers"], json!({"Accept": "application/json"}));

        let scenario = &file.scenarios[0];
        assert_eq!(scenario.request.method, Method::Post);
        assert_eq!(scenario.request.options["json"], json!({"title": "foo", "userId": 1}));
        assert_eq!(scenario.expect.has_key, vec!["id".to_string()]);
        assert_eq!(scenario.expect.json_path["$.userId"], json!(1));
        assert_eq!(scenario.expect.json_schema, Some(json!({"type": "object", "required": ["id"]})));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
scenarios:
  - name: typo
    request:
      endpoint: /
    expect:
      stauts: 200
"#;
        assert!(ScenarioFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let yaml = r#"
scenarios:
  - name: fetch
    request:
      method: FETCH
      endpoint: /
"#;
        assert!(ScenarioFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(ScenarioFile::from_yaml("base_url: http://x.test/").is_err());

        let yaml = r#"
scenarios:
  - name: ""
    request:
      endpoint: /
"#;
        assert!(ScenarioFile::from_yaml(yaml).is_err());

        let yaml = r#"
scenarios:
  - name: both bodies
    request:
      method: POST
      endpoint: /
      options:
        data: raw
        json: {}
"#;
        let err = ScenarioFile::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Scenario 0"));
    }

    #[test]
    fn test_null_body_does_not_conflict() {
        let yaml = r#"
scenarios:
  - name: json only
    request:
      method: POST
      endpoint: http://x.test/posts
      options:
        data: null
        json:
          title: foo
"#;
        let file = ScenarioFile::from_yaml(yaml).unwrap();
        assert_eq!(file.scenarios[0].request.options["data"], Value::Null);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "scenarios:\n  - name: ping\n    request:\n      endpoint: http://x.test/ping"
        )
        .unwrap();

        let loaded = ScenarioFile::from_file(file.path()).unwrap();
        assert_eq!(loaded.scenarios[0].name, "ping");

        assert!(ScenarioFile::from_file(Path::new("/nonexistent/scenarios.yaml")).is_err());
    }
}
