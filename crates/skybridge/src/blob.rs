//! Binary blob references, in both wire shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default PDS host for blob read URLs.
pub const DEFAULT_PDS: &str = "https://bsky.social";

/// A blob reference. The current wire shape is
/// `{"$type": "blob", "ref": {"$link": cid}, "mimeType", "size"}`; some
/// older records still carry the legacy `{cid, mimeType}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Blob {
    Typed(TypedBlob),
    Legacy(LegacyBlob),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedBlob {
    #[serde(rename = "$type")]
    pub kind: String,
    pub r#ref: BlobRef,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobRef {
    #[serde(rename = "$link")]
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBlob {
    pub cid: String,
    pub mime_type: String,
}

impl Blob {
    /// A current-shape blob reference.
    pub fn new(cid: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Blob::Typed(TypedBlob {
            kind: "blob".to_string(),
            r#ref: BlobRef { link: cid.into() },
            mime_type: mime_type.into(),
            size,
        })
    }

    pub fn cid(&self) -> &str {
        match self {
            Blob::Typed(b) => &b.r#ref.link,
            Blob::Legacy(b) => &b.cid,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Blob::Typed(b) => &b.mime_type,
            Blob::Legacy(b) => &b.mime_type,
        }
    }
}

/// Create path: look up the wire blob for a content URL in the
/// caller-supplied table. The engine never uploads on the caller's behalf.
pub fn blob_for_url<'a>(url: &str, blobs: &'a HashMap<String, Blob>) -> Option<&'a Blob> {
    blobs.get(url)
}

/// Read path: build the `com.atproto.sync.getBlob` URL for a blob in
/// either wire shape. Returns `None` for blobs without a valid shape.
pub fn blob_read_url(blob: &Blob, did: &str, pds: Option<&str>) -> Option<String> {
    if let Blob::Typed(b) = blob {
        if b.kind != "blob" {
            return None;
        }
    }
    let cid = blob.cid();
    if cid.is_empty() || did.is_empty() {
        return None;
    }

    let pds = pds.unwrap_or(DEFAULT_PDS).trim_end_matches('/');
    Some(format!(
        "{pds}/xrpc/com.atproto.sync.getBlob?did={did}&cid={cid}"
    ))
}
