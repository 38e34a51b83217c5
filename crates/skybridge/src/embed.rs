//! Post embeds: link previews, image sets, quotes, and quote+media
//! composites, in both their record and view shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::as1::{Image, Object};
use crate::blob::{Blob, blob_for_url, blob_read_url};
use crate::client::XrpcClient;
use crate::error::Result;
use crate::records::ProfileViewBasic;
use crate::refs::{StrongRef, resolve_ref};
use crate::uri::at_uri_to_web_url;

/// Maximum images per post; excess images are dropped, not an error.
pub const MAX_IMAGES: usize = 4;

/// The embed carried on a post record. A post has at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum PostEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images(ImagesEmbed),
    #[serde(rename = "app.bsky.embed.external")]
    External(ExternalEmbed),
    #[serde(rename = "app.bsky.embed.record")]
    Record(RecordEmbed),
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia(RecordWithMediaEmbed),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesEmbed {
    pub images: Vec<ImageEmbed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEmbed {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alt: String,
    pub image: Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEmbed {
    pub external: ExternalInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalInfo {
    pub uri: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<Blob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEmbed {
    pub record: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithMediaEmbed {
    pub record: RecordEmbed,
    pub media: MediaEmbed,
}

/// The media half of a quote+media composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum MediaEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images(ImagesEmbed),
    #[serde(rename = "app.bsky.embed.external")]
    External(ExternalEmbed),
}

/// Hydrated embed shapes as they appear on post views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum EmbedView {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images(ImagesView),
    #[serde(rename = "app.bsky.embed.external#view")]
    External(ExternalView),
    #[serde(rename = "app.bsky.embed.record#view")]
    Record(RecordView),
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia(RecordWithMediaView),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesView {
    pub images: Vec<ImageView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageView {
    pub thumb: Option<String>,
    pub fullsize: Option<String>,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalView {
    pub external: ExternalViewInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalViewInfo {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub record: EmbeddedRecord,
}

/// The target of a quote embed as hydrated in a view: present, blocked,
/// or gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum EmbeddedRecord {
    #[serde(rename = "app.bsky.embed.record#viewRecord")]
    ViewRecord(ViewRecord),
    #[serde(rename = "app.bsky.embed.record#viewBlocked")]
    ViewBlocked(ViewBlocked),
    #[serde(rename = "app.bsky.embed.record#viewNotFound")]
    ViewNotFound(ViewNotFound),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default)]
    pub author: ProfileViewBasic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBlocked {
    pub uri: String,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNotFound {
    pub uri: String,
    #[serde(default)]
    pub not_found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithMediaView {
    pub record: RecordView,
    pub media: Box<EmbedView>,
}

/// Build the single embed for a post, in precedence order: quote plus
/// local images, quote alone, images alone, then an external link from
/// the first link-type attachment.
///
/// Quote targets that can't be resolved fall back to plain link handling;
/// images without an uploaded blob are dropped.
pub fn build_embed(
    obj: &Object,
    client: Option<&dyn XrpcClient>,
    blobs: &HashMap<String, Blob>,
) -> Result<Option<PostEmbed>> {
    let quote = find_quote(obj, client);
    let images = collect_images(obj, blobs);

    if let Some(record) = quote {
        let record = RecordEmbed { record };
        if images.is_empty() {
            return Ok(Some(PostEmbed::Record(record)));
        }
        return Ok(Some(PostEmbed::RecordWithMedia(RecordWithMediaEmbed {
            record,
            media: MediaEmbed::Images(ImagesEmbed { images }),
        })));
    }

    if !images.is_empty() {
        return Ok(Some(PostEmbed::Images(ImagesEmbed { images })));
    }

    if let Some(external) = link_attachment(obj, blobs) {
        return Ok(Some(PostEmbed::External(ExternalEmbed { external })));
    }

    Ok(None)
}

/// The strong ref of the first quoted record among the attachments.
fn find_quote(obj: &Object, client: Option<&dyn XrpcClient>) -> Option<StrongRef> {
    for attachment in &obj.attachments {
        let kind = attachment.object_type.as_deref().unwrap_or("");
        if !matches!(kind, "note" | "article" | "comment") {
            continue;
        }
        let points_at_record = attachment
            .id_or_url()
            .is_some_and(|u| u.starts_with("at://"))
            || attachment
                .url
                .as_deref()
                .is_some_and(|u| u.contains("/post/"));
        if !points_at_record {
            continue;
        }
        match resolve_ref(attachment, client, false) {
            Ok(r) => return Some(r),
            Err(e) => {
                debug!(error = %e, "skipping unresolvable quote attachment");
                continue;
            }
        }
    }
    None
}

/// Images with uploaded blobs, capped at [`MAX_IMAGES`].
fn collect_images(obj: &Object, blobs: &HashMap<String, Blob>) -> Vec<ImageEmbed> {
    obj.image
        .iter()
        .filter_map(|img| {
            let url = img.url.as_deref()?;
            let blob = blob_for_url(url, blobs)?;
            Some(ImageEmbed {
                alt: img.display_name.clone().unwrap_or_default(),
                image: blob.clone(),
            })
        })
        .take(MAX_IMAGES)
        .collect()
}

/// External-link info from the first non-quote link attachment.
fn link_attachment(obj: &Object, blobs: &HashMap<String, Blob>) -> Option<ExternalInfo> {
    for attachment in &obj.attachments {
        let kind = attachment.object_type.as_deref().unwrap_or("");
        if !matches!(kind, "article" | "link") {
            continue;
        }
        let Some(url) = attachment.url.as_deref() else {
            continue;
        };
        if url.starts_with("at://") || url.contains("/post/") {
            continue;
        }
        let thumb = attachment
            .image
            .first()
            .and_then(|img| img.url.as_deref())
            .and_then(|u| blob_for_url(u, blobs))
            .cloned();
        return Some(ExternalInfo {
            uri: url.to_string(),
            title: attachment
                .display_name
                .clone()
                .unwrap_or_else(|| url.to_string()),
            description: attachment.summary.clone().unwrap_or_default(),
            thumb,
        });
    }
    None
}

/// Decompose a record-shape embed into AS1 attachments and images.
pub fn post_embed_to_as1(
    embed: &PostEmbed,
    did: &str,
    pds: Option<&str>,
) -> (Vec<Object>, Vec<Image>) {
    match embed {
        PostEmbed::Images(images) => {
            let images = images
                .images
                .iter()
                .filter_map(|img| {
                    let url = blob_read_url(&img.image, did, pds)?;
                    Some(Image::new(url, none_if_empty(&img.alt)))
                })
                .collect();
            (Vec::new(), images)
        }
        PostEmbed::External(external) => (vec![external_to_attachment(&external.external)], Vec::new()),
        PostEmbed::Record(record) => (vec![quote_ref_to_attachment(&record.record.uri)], Vec::new()),
        PostEmbed::RecordWithMedia(composite) => {
            let mut attachments = vec![quote_ref_to_attachment(&composite.record.record.uri)];
            let (mut media_attachments, images) = match &composite.media {
                MediaEmbed::Images(images) => {
                    post_embed_to_as1(&PostEmbed::Images(images.clone()), did, pds)
                }
                MediaEmbed::External(external) => {
                    post_embed_to_as1(&PostEmbed::External(external.clone()), did, pds)
                }
            };
            attachments.append(&mut media_attachments);
            (attachments, images)
        }
    }
}

/// Decompose a hydrated view embed into AS1 attachments and images.
pub fn embed_view_to_as1(view: &EmbedView) -> (Vec<Object>, Vec<Image>) {
    match view {
        EmbedView::Images(images) => {
            let images = images
                .images
                .iter()
                .filter_map(|img| {
                    let url = img.fullsize.as_deref().or(img.thumb.as_deref())?;
                    Some(Image::new(url, none_if_empty(&img.alt)))
                })
                .collect();
            (Vec::new(), images)
        }
        EmbedView::External(external) => {
            let info = &external.external;
            let mut attachment = external_to_attachment(&ExternalInfo {
                uri: info.uri.clone(),
                title: info.title.clone(),
                description: info.description.clone(),
                thumb: None,
            });
            if let Some(thumb) = &info.thumb {
                attachment.image = vec![Image::new(thumb.clone(), None)];
            }
            (vec![attachment], Vec::new())
        }
        EmbedView::Record(record) => (embedded_record_to_attachments(&record.record), Vec::new()),
        EmbedView::RecordWithMedia(composite) => {
            let mut attachments = embedded_record_to_attachments(&composite.record.record);
            let (mut media_attachments, images) = embed_view_to_as1(&composite.media);
            attachments.append(&mut media_attachments);
            (attachments, images)
        }
    }
}

fn embedded_record_to_attachments(record: &EmbeddedRecord) -> Vec<Object> {
    match record {
        EmbeddedRecord::ViewRecord(r) => vec![quote_ref_to_attachment(&r.uri)],
        // Blocked targets pass through as placeholders instead of erroring.
        EmbeddedRecord::ViewBlocked(r) => {
            let mut placeholder = quote_ref_to_attachment(&r.uri);
            placeholder.blocked = Some(true);
            vec![placeholder]
        }
        EmbeddedRecord::ViewNotFound(r) => vec![quote_ref_to_attachment(&r.uri)],
    }
}

fn quote_ref_to_attachment(uri: &str) -> Object {
    Object {
        object_type: Some("note".to_string()),
        id: Some(uri.to_string()),
        url: at_uri_to_web_url(uri, None).ok().flatten(),
        ..Default::default()
    }
}

fn external_to_attachment(info: &ExternalInfo) -> Object {
    Object {
        object_type: Some("article".to_string()),
        url: Some(info.uri.clone()),
        display_name: none_if_empty(&info.title),
        summary: none_if_empty(&info.description),
        ..Default::default()
    }
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
