// Supabase REST (PostgREST) backend

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

use super::query::{Operation, PostgrestError, Query, QueryResponse, TableBackend};
use crate::config::SupabaseConfig;

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Everything needed to issue one PostgREST request, minus the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParts {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

/// Supabase client configuration
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    /// Create a new Supabase client
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token: None,
        }
    }

    pub fn from_config(config: &SupabaseConfig) -> Self {
        let mut client = Self::new(config.project_url.clone(), config.api_key.clone());
        client.access_token = config.access_token.clone();
        client
    }

    /// Authenticate requests as a signed-in user instead of the anon key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Translate a query into method, url, params, headers and body.
    pub fn request_parts(&self, query: &Query) -> RequestParts {
        let url = format!("{}/rest/v1/{}", self.base_url, query.table);
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);

        let mut headers = vec![
            ("apikey", self.api_key.clone()),
            ("Authorization", format!("Bearer {}", bearer)),
        ];
        let mut params = Vec::new();

        let (method, body) = match &query.operation {
            Operation::Select { columns } => {
                params.push(("select".to_string(), columns.clone()));
                (Method::GET, None)
            }
            Operation::Insert { rows } => {
                headers.push(("Prefer", "return=representation".to_string()));
                let rows = rows.iter().cloned().map(Value::Object).collect();
                (Method::POST, Some(Value::Array(rows)))
            }
            Operation::Update { values } => {
                headers.push(("Prefer", "return=representation".to_string()));
                (Method::PATCH, Some(Value::Object(values.clone())))
            }
            Operation::Delete => {
                headers.push(("Prefer", "return=representation".to_string()));
                (Method::DELETE, None)
            }
        };

        if body.is_some() {
            headers.push(("Content-Type", "application/json".to_string()));
        }
        if query.single {
            headers.push(("Accept", OBJECT_MEDIA_TYPE.to_string()));
        }

        for filter in &query.filters {
            params.push((filter.column.clone(), format!("eq.{}", filter.encoded_value())));
        }

        RequestParts {
            method,
            url,
            params,
            headers,
            body,
        }
    }
}

/// Turn an HTTP status and raw body into the `{data, error}` shape.
pub fn parse_response(status: u16, body: &str) -> QueryResponse {
    if (200..300).contains(&status) {
        if body.trim().is_empty() {
            return QueryResponse::empty(status);
        }
        return match serde_json::from_str::<Value>(body) {
            Ok(data) => QueryResponse::ok(status, data),
            Err(e) => QueryResponse::failed(
                status,
                PostgrestError::new(format!("Failed to parse response: {}", e)),
            ),
        };
    }

    let error = serde_json::from_str::<PostgrestError>(body)
        .ok()
        .filter(|e| !e.message.is_empty())
        .unwrap_or_else(|| PostgrestError::new(format!("{}: {}", status, body.trim())));
    QueryResponse::failed(status, error)
}

#[async_trait]
impl TableBackend for SupabaseClient {
    async fn execute(&self, query: &Query) -> QueryResponse {
        let parts = self.request_parts(query);

        let mut request = self
            .client
            .request(parts.method, &parts.url)
            .query(&parts.params);
        for (name, value) in &parts.headers {
            request = request.header(*name, value);
        }
        if let Some(body) = &parts.body {
            request = request.json(body);
        }

        let res = match request.send().await {
            Ok(res) => res,
            Err(e) => {
                return QueryResponse::failed(
                    0,
                    PostgrestError::new(format!("Request failed: {}", e)),
                );
            }
        };

        let status = res.status().as_u16();
        match res.text().await {
            Ok(body) => parse_response(status, &body),
            Err(e) => QueryResponse::failed(
                status,
                PostgrestError::new(format!("Failed to read response: {}", e)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::remote::query::Filter;
    use serde_json::json;

    fn client() -> SupabaseClient {
        SupabaseClient::new("https://example.supabase.co/".into(), "anon-key".into())
    }

    fn header<'a>(parts: &'a RequestParts, name: &str) -> Option<&'a str> {
        parts
            .headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn select_single_by_id() {
        let mut query = Query::new("foos");
        query.filters.push(Filter {
            column: "id".into(),
            value: json!(3),
        });
        query.single = true;

        let parts = client().request_parts(&query);
        assert_eq!(parts.method, Method::GET);
        assert_eq!(parts.url, "https://example.supabase.co/rest/v1/foos");
        assert_eq!(
            parts.params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("id".to_string(), "eq.3".to_string())
            ]
        );
        assert_eq!(header(&parts, "Accept"), Some(OBJECT_MEDIA_TYPE));
        assert_eq!(header(&parts, "apikey"), Some("anon-key"));
        assert_eq!(header(&parts, "Authorization"), Some("Bearer anon-key"));
        assert!(parts.body.is_none());
    }

    #[test]
    fn insert_posts_an_array_and_asks_for_rows_back() {
        let mut row = serde_json::Map::new();
        row.insert("title".into(), json!("Launch"));
        let mut query = Query::new("foos");
        query.operation = Operation::Insert { rows: vec![row] };

        let parts = client().request_parts(&query);
        assert_eq!(parts.method, Method::POST);
        assert_eq!(parts.body, Some(json!([{ "title": "Launch" }])));
        assert_eq!(header(&parts, "Prefer"), Some("return=representation"));
        assert_eq!(header(&parts, "Content-Type"), Some("application/json"));
        assert!(parts.params.is_empty());
    }

    #[test]
    fn access_token_replaces_key_as_bearer() {
        let client = client().with_access_token("user-jwt");
        let mut query = Query::new("venues");
        query.operation = Operation::Delete;
        query.filters.push(Filter {
            column: "id".into(),
            value: json!(9),
        });

        let parts = client.request_parts(&query);
        assert_eq!(parts.method, Method::DELETE);
        assert_eq!(header(&parts, "Authorization"), Some("Bearer user-jwt"));
        assert_eq!(parts.params, vec![("id".to_string(), "eq.9".to_string())]);
    }

    #[test]
    fn parses_success_and_empty_bodies() {
        let ok = parse_response(200, r#"[{"id":1}]"#);
        assert_eq!(ok.data, Some(json!([{ "id": 1 }])));
        assert!(ok.error.is_none());

        let empty = parse_response(204, "");
        assert!(empty.data.is_none());
        assert!(empty.error.is_none());
    }

    #[test]
    fn parses_postgrest_error_objects() {
        let res = parse_response(
            406,
            r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        let error = res.error.expect("error");
        assert_eq!(error.code.as_deref(), Some("PGRST116"));
        assert_eq!(
            error.message,
            "JSON object requested, multiple (or no) rows returned"
        );
        assert!(res.data.is_none());
    }

    #[test]
    fn unstructured_error_bodies_keep_status_and_text() {
        let res = parse_response(502, "Bad Gateway\n");
        assert_eq!(res.error.map(|e| e.message), Some("502: Bad Gateway".to_string()));
    }
}
