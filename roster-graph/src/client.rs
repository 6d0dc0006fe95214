//! [`RemoteDirectory`] over Microsoft Graph contact folders.
//!
//! All calls go through [`GraphDirectory::send`], which attaches the bearer
//! token and retries transient failures (429, 5xx, transport) with backoff,
//! honoring `Retry-After`. POSTs are only resent when the server refused
//! them; see [`retryable`].

use std::thread;
use std::time::Duration;

use roster_core::{CollectionId, Config, LogicalRecord, RemoteId};
use roster_sync::{BatchItemResult, RemoteDirectory, RemoteError};
use serde_json::{json, Value};

use crate::error::GraphError;
use crate::retry::{parse_retry_after, retryable, RetryPolicy};
use crate::token::{ClientCredentials, TokenSource};

/// Page size requested when listing a folder.
pub const PAGE_SIZE: u32 = 1_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP agent with the client's timeouts.
pub fn build_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(IO_TIMEOUT)
        .timeout_write(IO_TIMEOUT)
        .user_agent(concat!("roster/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub struct GraphDirectory<T> {
    agent: ureq::Agent,
    base_url: String,
    mailbox: String,
    tokens: T,
    retry: RetryPolicy,
}

impl GraphDirectory<ClientCredentials> {
    /// Client for `config`, authenticating with client credentials.
    pub fn from_config(config: &Config) -> Result<Self, GraphError> {
        let agent = build_agent();
        let secret = config.auth.resolve_secret()?;
        let tokens = ClientCredentials::new(agent.clone(), &config.auth, secret);
        GraphDirectory::new(
            agent,
            &config.graph_base_url,
            &config.mailbox,
            tokens,
            RetryPolicy::from(&config.retry),
        )
    }
}

impl<T: TokenSource> GraphDirectory<T> {
    pub fn new(
        agent: ureq::Agent,
        base_url: &str,
        mailbox: &str,
        tokens: T,
        retry: RetryPolicy,
    ) -> Result<Self, GraphError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(GraphError::BaseUrl(base_url.to_string()));
        }
        Ok(Self {
            agent,
            base_url: base_url.to_string(),
            mailbox: mailbox.to_string(),
            tokens,
            retry,
        })
    }

    fn folder_path(&self, collection: &CollectionId) -> String {
        contacts_path(&self.mailbox, collection)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// One logical request, retried while [`retryable`] allows it.
    fn send(
        &mut self,
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ureq::Response, RemoteError> {
        let mut attempt = 0;
        loop {
            let token = self.tokens.token()?;
            let mut request = self
                .agent
                .request(method, url)
                .set("Authorization", &format!("Bearer {token}"))
                .set("Accept", "application/json");
            for (name, value) in query {
                request = request.query(name, value);
            }
            let result = match body {
                Some(body) => request.send_json(body.clone()),
                None => request.call(),
            };

            let (err, retry_after) = match result {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(code, response)) => {
                    let retry_after = parse_retry_after(response.header("retry-after"));
                    (status_error(code, response), retry_after)
                }
                Err(ureq::Error::Transport(t)) => (RemoteError::Transport(t.to_string()), None),
            };
            if !retryable(method, &err, retry_after) || attempt >= self.retry.max_retries {
                return Err(err);
            }
            let delay = self.retry.delay(attempt, retry_after);
            tracing::warn!(
                "{} {} failed ({}), retry {}/{} in {:?}",
                method,
                url,
                err,
                attempt + 1,
                self.retry.max_retries,
                delay
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    fn send_json(
        &mut self,
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        self.send(method, url, query, body)?
            .into_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl<T: TokenSource> RemoteDirectory for GraphDirectory<T> {
    fn resolve_collection(&mut self, name: &str) -> Result<CollectionId, RemoteError> {
        let url = self.url(&format!("/users/{}/contactFolders", self.mailbox));
        let filter = folder_filter(name);
        let body = self.send_json("GET", &url, &[("$filter", filter.as_str())], None)?;
        body.pointer("/value/0/id")
            .and_then(Value::as_str)
            .map(CollectionId::from)
            .ok_or_else(|| RemoteError::CollectionNotFound(name.to_string()))
    }

    fn list_ids(&mut self, collection: &CollectionId) -> Result<Vec<RemoteId>, RemoteError> {
        let first = self.url(&self.folder_path(collection));
        let top = PAGE_SIZE.to_string();
        let mut ids = Vec::new();
        let query = [("$select", "id"), ("$top", top.as_str())];
        let mut page = self.send_json("GET", &first, &query, None)?;
        let mut pages = 1;
        loop {
            let (page_ids, next) = parse_page(&page)
                .map_err(|e| RemoteError::IncompleteListing(format!("page {pages}: {e}")))?;
            ids.extend(page_ids);
            let Some(next) = next else { break };
            page = self
                .send_json("GET", &next, &[], None)
                .map_err(|e| RemoteError::IncompleteListing(format!("page {}: {e}", pages + 1)))?;
            pages += 1;
        }
        tracing::debug!("listed {} ids over {} pages", ids.len(), pages);
        Ok(ids)
    }

    fn create(
        &mut self,
        collection: &CollectionId,
        record: &LogicalRecord,
    ) -> Result<RemoteId, RemoteError> {
        let url = self.url(&self.folder_path(collection));
        let body = self.send_json("POST", &url, &[], Some(&record.to_body()))?;
        body.get("id")
            .and_then(Value::as_str)
            .map(RemoteId::from)
            .ok_or_else(|| RemoteError::Decode("created contact has no id".into()))
    }

    fn update(
        &mut self,
        collection: &CollectionId,
        id: &RemoteId,
        record: &LogicalRecord,
    ) -> Result<(), RemoteError> {
        let url = self.url(&format!("{}/{}", self.folder_path(collection), id));
        self.send("PATCH", &url, &[], Some(&record.to_body()))?;
        Ok(())
    }

    fn delete(&mut self, collection: &CollectionId, id: &RemoteId) -> Result<(), RemoteError> {
        let url = self.url(&format!("{}/{}", self.folder_path(collection), id));
        self.send("DELETE", &url, &[], None)?;
        Ok(())
    }

    fn submit_batch(
        &mut self,
        collection: &CollectionId,
        records: &[&LogicalRecord],
    ) -> Result<Vec<BatchItemResult>, RemoteError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("/$batch");
        let request = batch_request(&self.folder_path(collection), records);
        let response = self.send_json("POST", &url, &[], Some(&request))?;
        parse_batch_response(&response, records.len())
    }
}

// ---------------------------------------------------------------------------
// Request and response shapes
// ---------------------------------------------------------------------------

/// Folder-relative path of the contacts collection, as used inside `$batch`.
pub fn contacts_path(mailbox: &str, collection: &CollectionId) -> String {
    format!("/users/{}/contactFolders/{}/contacts", mailbox, collection)
}

/// OData filter selecting a folder by display name.
pub fn folder_filter(name: &str) -> String {
    format!("displayName eq '{}'", name.replace('\'', "''"))
}

/// Ids on one listing page and the next page link, if any.
pub fn parse_page(page: &Value) -> Result<(Vec<RemoteId>, Option<String>), RemoteError> {
    let values = page
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::Decode("page without 'value'".into()))?;
    let ids = values
        .iter()
        .map(|v| {
            v.get("id")
                .and_then(Value::as_str)
                .map(RemoteId::from)
                .ok_or_else(|| RemoteError::Decode("contact without id".into()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let next = page
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((ids, next))
}

/// `$batch` body creating `records` in the folder at `path`. Request ids
/// are the record positions.
pub fn batch_request(path: &str, records: &[&LogicalRecord]) -> Value {
    let requests: Vec<Value> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            json!({
                "id": i.to_string(),
                "method": "POST",
                "url": path,
                "body": record.to_body(),
                "headers": { "Content-Type": "application/json" },
            })
        })
        .collect();
    json!({ "requests": requests })
}

/// Positional results for a `$batch` response.
///
/// Graph may answer out of order, so responses are placed by their request
/// id. A submitted request without a response gets a failed result.
pub fn parse_batch_response(
    body: &Value,
    submitted: usize,
) -> Result<Vec<BatchItemResult>, RemoteError> {
    let responses = body
        .get("responses")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::Decode("batch response without 'responses'".into()))?;

    let mut results: Vec<Option<BatchItemResult>> = vec![None; submitted];
    for response in responses {
        let Some(index) = response
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| id.parse::<usize>().ok())
            .filter(|i| *i < submitted)
        else {
            tracing::warn!("ignoring batch response with unknown id: {}", response);
            continue;
        };
        let status = response
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0);
        let body = response.get("body").cloned().unwrap_or(Value::Null);
        results[index] = Some(BatchItemResult { status, body });
    }

    Ok(results
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| BatchItemResult {
                status: 0,
                body: json!({ "error": { "message": "no response for request" } }),
            })
        })
        .collect())
}

fn status_error(code: u16, response: ureq::Response) -> RemoteError {
    if code == 404 {
        return RemoteError::NotFound;
    }
    let text = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(text);
    if code == 401 {
        return RemoteError::Auth(message);
    }
    RemoteError::Status { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticToken;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Local HTTP server handling one connection per entry of `replies`.
    /// `None` reads the request and closes the connection without answering.
    fn serve(replies: Vec<Option<String>>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for reply in replies {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream);
                let mut length = 0;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                let mut body = vec![0; length];
                let _ = reader.read_exact(&mut body);
                if let Some(reply) = reply {
                    let mut stream = reader.into_inner();
                    let _ = stream.write_all(reply.as_bytes());
                }
            }
        });
        (base, hits)
    }

    fn reply(status: &str, headers: &str, body: &str) -> Option<String> {
        Some(format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
            body.len()
        ))
    }

    fn client(base: &str) -> GraphDirectory<StaticToken> {
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::ZERO,
        };
        GraphDirectory::new(
            build_agent(),
            base,
            "m@example.test",
            StaticToken("t".into()),
            retry,
        )
        .unwrap()
    }

    #[test]
    fn lost_batch_reply_is_not_resent() {
        let (base, hits) = serve(vec![
            None,
            reply(
                "200 OK",
                "",
                r#"{"responses":[{"id":"0","status":201,"body":{"id":"r0"}}]}"#,
            ),
        ]);
        let a = record("A");
        let err = client(&base)
            .submit_batch(&CollectionId::from("f"), &[&a])
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)), "got: {err}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throttled_batch_is_resent() {
        let (base, hits) = serve(vec![
            reply("429 Too Many Requests", "Retry-After: 0\r\n", "{}"),
            reply(
                "200 OK",
                "",
                r#"{"responses":[{"id":"0","status":201,"body":{"id":"r0"}}]}"#,
            ),
        ]);
        let a = record("A");
        let results = client(&base)
            .submit_batch(&CollectionId::from("f"), &[&a])
            .unwrap();
        assert_eq!(results[0].remote_id(), Some(RemoteId::from("r0")));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn server_error_on_create_is_not_resent() {
        let (base, hits) = serve(vec![
            reply(
                "500 Internal Server Error",
                "",
                r#"{"error":{"message":"boom"}}"#,
            ),
            reply("201 Created", "", r#"{"id":"r1"}"#),
        ]);
        let err = client(&base)
            .create(&CollectionId::from("f"), &record("A"))
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Status {
                code: 500,
                message: "boom".into()
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_listing_is_retried() {
        let (base, hits) = serve(vec![
            None,
            reply("200 OK", "", r#"{"value":[{"id":"a"}]}"#),
        ]);
        let ids = client(&base).list_ids(&CollectionId::from("f")).unwrap();
        assert_eq!(ids, vec![RemoteId::from("a")]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    fn record(name: &str) -> LogicalRecord {
        [("displayName", json!(name))].into_iter().collect()
    }

    #[test]
    fn folder_filter_escapes_quotes() {
        assert_eq!(
            folder_filter("O'Brien contacts"),
            "displayName eq 'O''Brien contacts'"
        );
    }

    #[test]
    fn page_with_next_link() {
        let page = json!({
            "value": [{ "id": "a" }, { "id": "b" }],
            "@odata.nextLink": "https://graph.test/next?$skip=2",
        });
        let (ids, next) = parse_page(&page).unwrap();
        assert_eq!(ids, vec![RemoteId::from("a"), RemoteId::from("b")]);
        assert_eq!(next.as_deref(), Some("https://graph.test/next?$skip=2"));
    }

    #[test]
    fn page_without_value_is_rejected() {
        let err = parse_page(&json!({ "error": { "message": "throttled" } })).unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn batch_request_numbers_requests_by_position() {
        let a = record("A");
        let b = record("B");
        let body = batch_request("/users/m/contactFolders/f/contacts", &[&a, &b]);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["id"], "1");
        assert_eq!(requests[1]["method"], "POST");
        assert_eq!(requests[1]["body"], json!({ "displayName": "B" }));
    }

    #[test]
    fn batch_responses_are_reordered_by_id() {
        let body = json!({ "responses": [
            { "id": "2", "status": 201, "body": { "id": "r2" } },
            { "id": "0", "status": 201, "body": { "id": "r0" } },
            { "id": "1", "status": 400, "body": { "error": { "message": "bad" } } },
        ]});
        let results = parse_batch_response(&body, 3).unwrap();
        assert_eq!(results[0].remote_id(), Some(RemoteId::from("r0")));
        assert!(!results[1].is_success());
        assert_eq!(results[1].error_message(), "bad");
        assert_eq!(results[2].remote_id(), Some(RemoteId::from("r2")));
    }

    #[test]
    fn missing_batch_response_becomes_failure() {
        let body = json!({ "responses": [
            { "id": "0", "status": 201, "body": { "id": "r0" } },
            { "id": "7", "status": 201, "body": { "id": "stray" } },
        ]});
        let results = parse_batch_response(&body, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[1].status, 0);
        assert_eq!(results[1].error_message(), "no response for request");
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let result = GraphDirectory::new(
            build_agent(),
            "graph.microsoft.com/beta",
            "m@example.test",
            StaticToken("t".into()),
            RetryPolicy::none(),
        );
        assert!(matches!(result, Err(GraphError::BaseUrl(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = GraphDirectory::new(
            build_agent(),
            "https://graph.test/beta/",
            "m@example.test",
            StaticToken("t".into()),
            RetryPolicy::none(),
        )
        .unwrap();
        assert_eq!(
            client.url(&contacts_path("m@example.test", &CollectionId::from("f"))),
            "https://graph.test/beta/users/m@example.test/contactFolders/f/contacts"
        );
    }
}
