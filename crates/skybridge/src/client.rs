//! XRPC transport: the injected client trait and a blocking PDS client.

use std::cell::RefCell;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::blob::Blob;
use crate::error::{Error, Result};

/// The transport surface the engine consumes. Implementations return
/// parsed JSON or fail; the engine never retries on their behalf.
pub trait XrpcClient {
    /// Issue an XRPC query (HTTP GET) for `nsid` with query parameters.
    fn get(&self, nsid: &str, params: &[(&str, &str)]) -> Result<Value>;

    /// Issue an XRPC procedure (HTTP POST) for `nsid` with a JSON body.
    fn post(&self, nsid: &str, body: &Value) -> Result<Value>;
}

/// An authenticated session with a PDS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Blocking client for a single PDS.
///
/// Calls are synchronous call-and-return; timeout policy lives in the
/// underlying HTTP client and there are no internal retries.
pub struct PdsClient {
    http: reqwest::blocking::Client,
    pds_url: String,
    session: RefCell<Option<Session>>,
}

impl PdsClient {
    /// A client for the given PDS base URL, e.g. `https://bsky.social`.
    pub fn new(pds_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            pds_url: pds_url.into().trim_end_matches('/').to_string(),
            session: RefCell::new(None),
        })
    }

    /// Authenticate via `com.atproto.server.createSession`.
    pub fn login(&self, identifier: &str, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&serde_json::json!({
                "identifier": identifier,
                "password": password,
            }))
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(Error::Auth(format!("login failed ({status}): {text}")));
        }

        let session: Session = response.json()?;
        debug!(did = %session.did, handle = %session.handle, "authenticated with PDS");
        *self.session.borrow_mut() = Some(session);
        Ok(())
    }

    /// The authenticated DID, if logged in.
    pub fn did(&self) -> Option<String> {
        self.session.borrow().as_ref().map(|s| s.did.clone())
    }

    /// The authenticated handle, if logged in.
    pub fn handle(&self) -> Option<String> {
        self.session.borrow().as_ref().map(|s| s.handle.clone())
    }

    /// Resolve a handle to a DID.
    pub fn resolve_handle(&self, handle: &str) -> Result<String> {
        let resp = self.get("com.atproto.identity.resolveHandle", &[("handle", handle)])?;
        resp.get("did")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidResponse(format!("no did for handle {handle}")))
    }

    /// Fetch one record by repo, collection, and rkey.
    pub fn get_record(&self, repo: &str, collection: &str, rkey: &str) -> Result<Value> {
        self.get(
            "com.atproto.repo.getRecord",
            &[("repo", repo), ("collection", collection), ("rkey", rkey)],
        )
    }

    /// Create a record in the authenticated repository. The record value
    /// must already carry its `$type`.
    pub fn create_record(&self, collection: &str, record: &Value) -> Result<Value> {
        let did = self.require_session()?;
        debug!(collection, "creating record");
        self.post(
            "com.atproto.repo.createRecord",
            &serde_json::json!({
                "repo": did,
                "collection": collection,
                "record": record,
            }),
        )
    }

    /// Delete a record from the authenticated repository.
    pub fn delete_record(&self, collection: &str, rkey: &str) -> Result<()> {
        let did = self.require_session()?;
        debug!(collection, rkey, "deleting record");
        self.post(
            "com.atproto.repo.deleteRecord",
            &serde_json::json!({
                "repo": did,
                "collection": collection,
                "rkey": rkey,
            }),
        )?;
        Ok(())
    }

    /// Upload binary data, returning the wire blob to embed in a record.
    pub fn upload_blob(&self, data: Vec<u8>, mime_type: &str) -> Result<Blob> {
        let token = self.access_token()?;
        debug!(size = data.len(), mime_type, "uploading blob");

        let response = self
            .http
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", mime_type)
            .body(data)
            .send()?;
        let body = handle_response(response)?;

        let blob = body
            .get("blob")
            .cloned()
            .ok_or_else(|| Error::InvalidResponse("uploadBlob response has no blob".to_string()))?;
        Ok(serde_json::from_value(blob)?)
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{nsid}", self.pds_url)
    }

    fn require_session(&self) -> Result<String> {
        self.did()
            .ok_or_else(|| Error::Auth("not authenticated".to_string()))
    }

    fn access_token(&self) -> Result<String> {
        self.session
            .borrow()
            .as_ref()
            .map(|s| s.access_jwt.clone())
            .ok_or_else(|| Error::Auth("not authenticated".to_string()))
    }
}

impl XrpcClient for PdsClient {
    fn get(&self, nsid: &str, params: &[(&str, &str)]) -> Result<Value> {
        let mut request = self.http.get(self.xrpc_url(nsid)).query(params);
        if let Ok(token) = self.access_token() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        handle_response(request.send()?)
    }

    fn post(&self, nsid: &str, body: &Value) -> Result<Value> {
        let mut request = self.http.post(self.xrpc_url(nsid)).json(body);
        if let Ok(token) = self.access_token() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        handle_response(request.send()?)
    }
}

/// Parse an XRPC response, surfacing `{error, message}` bodies.
fn handle_response(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();

    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        if let Ok(xrpc) = serde_json::from_str::<XrpcErrorBody>(&text) {
            return Err(Error::Xrpc {
                error: xrpc.error,
                message: xrpc.message.unwrap_or_default(),
            });
        }
        return Err(Error::InvalidResponse(format!(
            "request failed ({status}): {text}"
        )));
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    Ok(response.json()?)
}

/// XRPC error response format.
#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: String,
    message: Option<String>,
}
