//! Content-addressed strong references and their resolution.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::as1::Object;
use crate::client::XrpcClient;
use crate::error::{Error, Result};
use crate::records::Record;
use crate::uri::{self, AtUri, is_did};

/// A strong reference: an AT-URI plus the CID of one immutable version of
/// the record it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    /// Empty only as a placeholder before resolution.
    #[serde(default)]
    pub cid: String,
    /// The record body when fetched with `want_value`. In-memory only.
    #[serde(skip)]
    pub value: Option<Box<Record>>,
}

impl StrongRef {
    pub fn new(uri: impl Into<String>, cid: impl Into<String>) -> Self {
        StrongRef {
            uri: uri.into(),
            cid: cid.into(),
            value: None,
        }
    }

    /// Drop the in-memory record body, keeping the wire pair.
    pub fn without_value(mut self) -> StrongRef {
        self.value = None;
        self
    }
}

/// Resolve an AS1 object to a strong reference.
///
/// An object already carrying `{uri, cid}` is returned unchanged. Otherwise
/// the AT-URI is derived from `id`/`url`, and, when a client is supplied,
/// the handle is resolved to a DID and one record fetch fills in the CID
/// (and the record body when `want_value`). Without a client the CID stays
/// an empty placeholder. Transport failures propagate unmodified.
pub fn resolve_ref(
    obj: &Object,
    client: Option<&dyn XrpcClient>,
    want_value: bool,
) -> Result<StrongRef> {
    if let (Some(uri), Some(cid)) = (
        obj.extra.get("uri").and_then(|v| v.as_str()),
        obj.extra.get("cid").and_then(|v| v.as_str()),
    ) {
        return Ok(StrongRef::new(uri, cid));
    }

    let parsed = at_uri_for(obj)?;
    let Some(client) = client else {
        return Ok(StrongRef::new(parsed.to_string(), ""));
    };

    let authority = if is_did(&parsed.authority) {
        parsed.authority.clone()
    } else {
        let resp = client.get(
            "com.atproto.identity.resolveHandle",
            &[("handle", &parsed.authority)],
        )?;
        resp.get("did")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("no did for handle {}", parsed.authority))
            })?
    };

    let (Some(collection), Some(rkey)) = (parsed.collection.as_deref(), parsed.rkey.as_deref())
    else {
        return Err(Error::invalid(format!(
            "can't fetch a record for repository URI {parsed}"
        )));
    };

    let resp = client.get(
        "com.atproto.repo.getRecord",
        &[
            ("repo", &authority),
            ("collection", collection),
            ("rkey", rkey),
        ],
    )?;
    debug!(uri = %parsed, "resolved strong ref");

    let uri = resp
        .get("uri")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| AtUri::record(authority, collection, rkey).to_string());
    let cid = resp
        .get("cid")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let value = if want_value {
        resp.get("value")
            .cloned()
            .and_then(|v| serde_json::from_value::<Record>(v).ok())
            .map(Box::new)
    } else {
        None
    };

    Ok(StrongRef { uri, cid, value })
}

/// The AT-URI an object refers to: an `at://` `id`/`url` as-is, or a web
/// URL run through the URI translator.
fn at_uri_for(obj: &Object) -> Result<AtUri> {
    for candidate in [obj.id.as_deref(), obj.url.as_deref()] {
        if let Some(c) = candidate {
            if c.starts_with("at://") {
                return AtUri::parse(c);
            }
        }
    }
    if let Some(url) = obj.url.as_deref() {
        if let Some(parsed) = uri::web_url_to_at_uri(url, None, None)? {
            return Ok(parsed);
        }
    }
    Err(Error::invalid(format!(
        "no AT-URI or web URL to resolve: {:?}",
        obj.id_or_url()
    )))
}
