//! Remote API catalog: wire model and fetch client.
//!
//! The catalog exposes three read endpoints, all authenticated by a project
//! token in the query string:
//! - `GET /api/project/get`: project metadata and base path
//! - `GET /api/interface/list_menu`: categories with their operation ids
//! - `GET /api/interface/get`: one operation in full
//!
//! Every response is wrapped as `{errcode, errmsg, data}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::version::APIGEN_VERSION;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("{endpoint} returned error {code}: {message}")]
    Api {
        endpoint: &'static str,
        code: i64,
        message: String,
    },

    #[error("unexpected payload from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    #[serde(rename = "_id")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub basepath: Option<String>,
}

/// One entry of `list_menu`: a category and the ids of its operations.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySummary {
    #[serde(rename = "_id")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Used as the output file name when non-empty.
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub list: Vec<OperationRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationRef {
    #[serde(rename = "_id")]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
}

/// A path or query parameter as the catalog stores it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParam {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    /// `"1"` means required. Absent on path parameters.
    #[serde(default)]
    pub required: Option<Value>,
}

impl RawParam {
    pub fn is_flagged_required(&self) -> bool {
        matches!(self.required, Some(Value::String(ref s)) if s == "1")
    }
}

/// Full operation definition. Body and response schemas arrive as JSON text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOperation {
    #[serde(rename = "_id", default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub req_query: Vec<RawParam>,
    #[serde(default)]
    pub req_params: Vec<RawParam>,
    #[serde(default)]
    pub req_body_type: Option<String>,
    #[serde(default)]
    pub req_body_other: Option<String>,
    #[serde(default)]
    pub res_body_type: Option<String>,
    #[serde(default)]
    pub res_body_is_json_schema: bool,
    #[serde(default)]
    pub res_body: Option<String>,
}

/// `"/" + (basepath or "/")` with trailing slashes removed and leading
/// slashes collapsed: `None → ""`, `"api/" → "/api"`.
pub fn normalize_base_path(basepath: Option<&str>) -> String {
    let raw = match basepath {
        Some(p) if !p.is_empty() => p,
        _ => "/",
    };
    let joined = format!("/{raw}");
    let trimmed = joined.trim_end_matches('/');
    let rest = trimmed.trim_start_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{rest}")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Read access to one project of the catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Project metadata and its normalized base path.
    async fn fetch_project(&self) -> Result<(ProjectMeta, String)>;

    async fn fetch_category_list(&self, project_id: u64) -> Result<Vec<CategorySummary>>;

    async fn fetch_operation(&self, operation_id: u64) -> Result<RawOperation>;
}

/// Fetch every operation of `category` concurrently. Failed fetches are
/// logged and left out; list order is kept.
pub async fn fetch_operations(
    client: &dyn CatalogClient,
    category: &CategorySummary,
) -> Vec<RawOperation> {
    let fetches = category
        .list
        .iter()
        .map(|op| async move { (op, client.fetch_operation(op.id).await) });

    join_all(fetches)
        .await
        .into_iter()
        .filter_map(|(op, result)| match result {
            Ok(operation) => Some(operation),
            Err(e) => {
                tracing::warn!(
                    category = category.id,
                    operation = op.id,
                    path = %op.path,
                    error = %e,
                    "Failed to fetch operation, skipping"
                );
                None
            }
        })
        .collect()
}

/// [`CatalogClient`] over HTTP.
pub struct HttpCatalogClient {
    host: String,
    token: String,
    client: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(host: &str, token: impl Into<String>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = format!("apigen/{}", APIGEN_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CatalogError::Client)?;

        Ok(Self {
            host: normalize_host(host),
            token: token.into(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.host, endpoint))
            .query(&[("token", self.token.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|source| CatalogError::Http { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|source| CatalogError::Http { endpoint, source })?;
        let payload = unwrap_envelope(endpoint, body)?;
        serde_json::from_value(payload).map_err(|source| CatalogError::Decode { endpoint, source })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_project(&self) -> Result<(ProjectMeta, String)> {
        let project: ProjectMeta = self.get("/api/project/get", &[]).await?;
        let base = normalize_base_path(project.basepath.as_deref());
        tracing::debug!(project = project.id, name = %project.name, base = %base, "Fetched project");
        Ok((project, base))
    }

    async fn fetch_category_list(&self, project_id: u64) -> Result<Vec<CategorySummary>> {
        self.get(
            "/api/interface/list_menu",
            &[("project_id", project_id.to_string())],
        )
        .await
    }

    async fn fetch_operation(&self, operation_id: u64) -> Result<RawOperation> {
        self.get("/api/interface/get", &[("id", operation_id.to_string())])
            .await
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// The payload is `data` when present, otherwise the whole body.
fn unwrap_envelope(endpoint: &'static str, body: Value) -> Result<Value> {
    let Value::Object(mut map) = body else {
        return Ok(body);
    };
    let code = map.get("errcode").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = map
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(CatalogError::Api {
            endpoint,
            code,
            message,
        });
    }
    match map.remove("data") {
        Some(data) if !data.is_null() => Ok(data),
        Some(_) | None => Ok(Value::Object(map)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn base_path_normalization() {
        assert_eq!(normalize_base_path(None), "");
        assert_eq!(normalize_base_path(Some("")), "");
        assert_eq!(normalize_base_path(Some("/")), "");
        assert_eq!(normalize_base_path(Some("api/")), "/api");
        assert_eq!(normalize_base_path(Some("/api")), "/api");
        assert_eq!(normalize_base_path(Some("//v1/api//")), "/v1/api");
    }

    #[test]
    fn host_gets_scheme() {
        assert_eq!(normalize_host("catalog.local:3000/"), "http://catalog.local:3000");
        assert_eq!(normalize_host("https://catalog.example.org"), "https://catalog.example.org");
    }

    #[test]
    fn required_flag_is_the_string_one() {
        let param = |required| RawParam {
            name: "q".into(),
            desc: None,
            required,
        };
        assert!(param(Some(json!("1"))).is_flagged_required());
        assert!(!param(Some(json!("0"))).is_flagged_required());
        assert!(!param(Some(json!(1))).is_flagged_required());
        assert!(!param(None).is_flagged_required());
    }

    #[test]
    fn envelope_without_data_is_the_payload() {
        let body = json!({"_id": 3, "name": "bare"});
        assert_eq!(unwrap_envelope("x", body.clone()).unwrap(), body);
    }

    #[tokio::test]
    async fn fetches_project_and_normalizes_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/project/get"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "成功！",
                "data": {"_id": 11, "name": "shop", "basepath": "shop/"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(&server.uri(), "secret").unwrap();
        let (project, base) = client.fetch_project().await.unwrap();
        assert_eq!(project.id, 11);
        assert_eq!(base, "/shop");
    }

    #[tokio::test]
    async fn fetches_category_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/interface/list_menu"))
            .and(query_param("project_id", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "data": [
                    {"_id": 1, "name": "users", "desc": "", "list": [{"_id": 100, "title": "List", "path": "/users"}]},
                    {"_id": 2, "name": "empty", "list": []}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(&server.uri(), "t").unwrap();
        let categories = client.fetch_category_list(11).await.unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].list[0].id, 100);
        assert!(categories[1].desc.is_none());
    }

    #[tokio::test]
    async fn nonzero_errcode_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 40011,
                "errmsg": "请登录...",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(&server.uri(), "t").unwrap();
        let err = client.fetch_operation(5).await.unwrap_err();
        assert!(matches!(err, CatalogError::Api { code: 40011, .. }));
    }

    #[tokio::test]
    async fn http_status_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(&server.uri(), "t").unwrap();
        let err = client.fetch_operation(5).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn failed_operation_fetches_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .and(query_param("id", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "data": {
                    "_id": 1,
                    "title": "Get user",
                    "path": "/user/{id}",
                    "method": "GET",
                    "req_params": [{"_id": "p1", "name": "id", "desc": "User id"}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .and(query_param("id", "2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(&server.uri(), "t").unwrap();
        let category = CategorySummary {
            id: 9,
            name: "users".into(),
            desc: None,
            list: vec![
                OperationRef { id: 1, title: String::new(), path: "/user/{id}".into() },
                OperationRef { id: 2, title: String::new(), path: "/user".into() },
            ],
        };
        let operations = fetch_operations(&client, &category).await;
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].req_params[0].name, "id");
        assert_eq!(operations[0].req_params[0].desc.as_deref(), Some("User id"));
    }
}
