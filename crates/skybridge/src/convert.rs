//! The record mapper: `from_as1` / `to_as1`, the two closed dispatch
//! tables at the center of the engine.
//!
//! Writes (`from_as1`) consult the facet engine, truncator, embed builder,
//! and strong-ref resolver; reads (`to_as1`) reconstruct identifiers from
//! the caller-supplied URI and repository identity, since stored records
//! do not self-describe their own AT-URIs.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use crate::as1::{Activity, As1, Image, Object};
use crate::blob::{Blob, blob_for_url, blob_read_url};
use crate::client::XrpcClient;
use crate::embed::{
    ExternalEmbed, ExternalInfo, PostEmbed, build_embed, embed_view_to_as1, post_embed_to_as1,
};
use crate::error::{Error, Result};
use crate::facet::{Facet, FacetFeature, facets_from_tags, tags_from_facets};
use crate::records::{
    Block, CURATE_LIST_PURPOSE, FeedViewPost, Follow, Like, List, ListItem, Post, PostView,
    Profile, ProfileView, ProfileViewBasic, REASON_OTHER, ReasonRepost, Record, ReplyRef,
    ReportInput, Repost,
};
use crate::refs::resolve_ref;
use crate::truncate::{MAX_POST_GRAPHEMES, enforce_limit, grapheme_count};
use crate::uri::{AtUri, BSKY_APP_HOST, at_uri_to_web_url, is_did, web_url_to_at_uri};

/// The record shape `from_as1` should produce when an activity maps to
/// more than one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutType {
    /// The writable repository record.
    #[default]
    Record,
    PostView,
    FeedViewPost,
    ReasonRepost,
    ProfileView,
    ProfileViewBasic,
    ProfileViewDetailed,
}

/// Convert an AS1 document into a protocol record.
///
/// Dispatches on the document's `(objectType, verb)` pair. `blobs` maps
/// already-uploaded content URLs to their wire blobs; the mapper never
/// uploads. An unsupported combination, or an `out_type` the inferred
/// record kind can't produce, is an [`Error::InvalidInput`].
pub fn from_as1(
    doc: &As1,
    out_type: OutType,
    client: Option<&dyn XrpcClient>,
    blobs: &HashMap<String, Blob>,
) -> Result<Record> {
    let (verb, activity) = match doc {
        As1::Activity(a) => (a.verb.as_deref().unwrap_or("post"), Some(a)),
        As1::Object(_) => ("post", None),
    };
    let obj = doc
        .as_object()
        .ok_or_else(|| Error::invalid(format!("{verb} activity has no object")))?;
    let kind = obj.object_type.as_deref().unwrap_or("");

    match (verb, kind) {
        ("share", _) => share_to_record(activity, obj, out_type, client, blobs),
        ("like" | "favorite", _) => {
            expect_record_out(out_type, "like")?;
            Ok(Record::Like(Like {
                subject: resolve_ref(obj, client, false)?.without_value(),
                created_at: created_at(activity.and_then(|a| a.published.as_deref())),
            }))
        }
        ("follow", _) => {
            expect_record_out(out_type, "follow")?;
            Ok(Record::Follow(Follow {
                subject: actor_did(obj, client)?,
                created_at: created_at(activity.and_then(|a| a.published.as_deref())),
            }))
        }
        ("block", _) => {
            expect_record_out(out_type, "block")?;
            Ok(Record::Block(Block {
                subject: actor_did(obj, client)?,
                created_at: created_at(activity.and_then(|a| a.published.as_deref())),
            }))
        }
        ("flag", _) => {
            expect_record_out(out_type, "flag")?;
            let reason = activity
                .and_then(|a| a.extra.get("content"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| obj.content.clone());
            Ok(Record::Report(ReportInput {
                reason_type: REASON_OTHER.to_string(),
                reason,
                subject: resolve_ref(obj, client, false)?.without_value().into(),
            }))
        }
        ("add", _) => {
            expect_record_out(out_type, "add")?;
            let target = activity
                .and_then(|a| a.extra.get("target"))
                .map(target_object)
                .transpose()?
                .ok_or_else(|| Error::invalid("add activity has no target collection"))?;
            Ok(Record::ListItem(ListItem {
                subject: actor_did(obj, client)?,
                list: resolve_ref(&target, None, false)?.uri,
                created_at: created_at(activity.and_then(|a| a.published.as_deref())),
            }))
        }
        (_, "person") => person_to_record(obj, out_type, blobs),
        (_, "collection") => {
            expect_record_out(out_type, "collection")?;
            Ok(Record::List(List {
                purpose: CURATE_LIST_PURPOSE.to_string(),
                name: obj.display_name.clone().unwrap_or_default(),
                description: obj.summary.clone(),
                created_at: created_at(obj.published.as_deref()),
            }))
        }
        ("post", "" | "note" | "article" | "comment") => {
            let post = build_post(obj, client, blobs)?;
            match out_type {
                OutType::Record => Ok(Record::Post(post)),
                OutType::PostView => Ok(Record::PostView(post_view(post, obj))),
                OutType::FeedViewPost => Ok(Record::FeedViewPost(FeedViewPost {
                    post: post_view(post, obj),
                    reason: None,
                })),
                _ => Err(Error::invalid(format!(
                    "post can't produce {out_type:?} output"
                ))),
            }
        }
        _ => Err(Error::invalid(format!(
            "unsupported AS1 input: verb {verb:?}, objectType {kind:?}"
        ))),
    }
}

/// Convert a protocol record back to an AS1 document.
///
/// `uri`, `repo_did`, and `repo_handle` supply the identity the record
/// itself omits; `pds` overrides the default blob host. Bookkeeping
/// fields (`cid`, counts) are intentionally one-directional.
pub fn to_as1(
    record: &Record,
    uri: Option<&str>,
    repo_did: Option<&str>,
    repo_handle: Option<&str>,
    pds: Option<&str>,
) -> Result<As1> {
    match record {
        Record::Post(post) => Ok(As1::Object(post_to_object(
            post,
            uri,
            repo_did,
            repo_handle,
            pds,
        )?)),
        Record::Repost(repost) => Ok(As1::Activity(subject_activity(
            "share",
            &repost.subject.uri,
            Some(&repost.created_at),
        )?)),
        Record::Like(like) => Ok(As1::Activity(subject_activity(
            "like",
            &like.subject.uri,
            Some(&like.created_at),
        )?)),
        Record::Follow(follow) => Ok(As1::Activity(Activity {
            verb: Some("follow".to_string()),
            published: Some(follow.created_at.clone()),
            object: Some(Box::new(person_stub(&follow.subject))),
            ..Default::default()
        })),
        Record::Block(block) => Ok(As1::Activity(Activity {
            verb: Some("block".to_string()),
            published: Some(block.created_at.clone()),
            object: Some(Box::new(person_stub(&block.subject))),
            ..Default::default()
        })),
        Record::List(list) => Ok(As1::Object(Object {
            object_type: Some("collection".to_string()),
            id: uri.map(str::to_string),
            url: uri.and_then(|u| at_uri_to_web_url(u, repo_handle).ok().flatten()),
            display_name: Some(list.name.clone()),
            summary: list.description.clone(),
            published: Some(list.created_at.clone()),
            ..Default::default()
        })),
        Record::ListItem(item) => {
            let mut activity = Activity {
                verb: Some("add".to_string()),
                published: Some(item.created_at.clone()),
                object: Some(Box::new(person_stub(&item.subject))),
                ..Default::default()
            };
            activity
                .extra
                .insert("target".to_string(), serde_json::json!({"id": item.list}));
            Ok(As1::Activity(activity))
        }
        Record::Generator(generator) => Ok(As1::Object(Object {
            object_type: Some("service".to_string()),
            id: uri.map(str::to_string),
            url: uri.and_then(|u| at_uri_to_web_url(u, repo_handle).ok().flatten()),
            display_name: Some(generator.display_name.clone()),
            summary: generator.description.clone(),
            published: Some(generator.created_at.clone()),
            ..Default::default()
        })),
        Record::Profile(profile) => Ok(As1::Object(profile_to_person(
            profile,
            repo_did,
            repo_handle,
            pds,
        ))),
        Record::Report(report) => Ok(As1::Activity(subject_activity(
            "flag",
            &report.subject.uri,
            None,
        )?)),
        Record::PostView(view) => Ok(As1::Object(post_view_to_object(view, pds)?)),
        Record::FeedViewPost(view) => {
            let object = post_view_to_object(&view.post, pds)?;
            match &view.reason {
                Some(reason) => Ok(As1::Activity(Activity {
                    verb: Some("share".to_string()),
                    actor: Some(Box::new(basic_to_person(&reason.by))),
                    published: reason.indexed_at.clone(),
                    object: Some(Box::new(object)),
                    ..Default::default()
                })),
                None => Ok(As1::Object(object)),
            }
        }
        Record::ThreadViewPost(thread) => crate::thread::thread_to_as1(thread, pds),
        Record::ReasonRepost(reason) => Ok(As1::Activity(Activity {
            verb: Some("share".to_string()),
            actor: Some(Box::new(basic_to_person(&reason.by))),
            published: reason.indexed_at.clone(),
            ..Default::default()
        })),
        Record::BlockedPost(blocked) => Ok(As1::Object(blocked_placeholder(&blocked.uri))),
        Record::NotFoundPost(missing) => Ok(As1::Object(Object {
            object_type: Some("note".to_string()),
            id: Some(missing.uri.clone()),
            url: at_uri_to_web_url(&missing.uri, repo_handle).ok().flatten(),
            ..Default::default()
        })),
        Record::ProfileView(view) | Record::ProfileViewDetailed(view) => {
            Ok(As1::Object(view_to_person(view)))
        }
        Record::ProfileViewBasic(view) => Ok(As1::Object(basic_to_person(view))),
    }
}

/// Placeholder object for a blocked post.
pub(crate) fn blocked_placeholder(uri: &str) -> Object {
    Object {
        object_type: Some("note".to_string()),
        id: Some(uri.to_string()),
        url: at_uri_to_web_url(uri, None).ok().flatten(),
        blocked: Some(true),
        ..Default::default()
    }
}

/// Hydrated post view → AS1 object, preferring the view's embed and
/// author over what the inner record can reconstruct.
pub(crate) fn post_view_to_object(view: &PostView, pds: Option<&str>) -> Result<Object> {
    let handle = match view.author.handle.as_str() {
        "" => None,
        h => Some(h),
    };
    let inner = to_as1(
        &view.record,
        Some(&view.uri),
        Some(&view.author.did),
        handle,
        pds,
    )?;
    let As1::Object(mut object) = inner else {
        return Err(Error::InvalidResponse(format!(
            "post view {} does not wrap a post record",
            view.uri
        )));
    };

    object.author = Some(Box::new(basic_to_person(&view.author)));
    if let Some(embed) = &view.embed {
        let (attachments, images) = embed_view_to_as1(embed);
        object.attachments = attachments;
        object.image = images;
    }
    Ok(object)
}

fn post_to_object(
    post: &Post,
    uri: Option<&str>,
    repo_did: Option<&str>,
    repo_handle: Option<&str>,
    pds: Option<&str>,
) -> Result<Object> {
    let did = repo_did
        .map(str::to_string)
        .or_else(|| authority_did(uri))
        .unwrap_or_default();

    let (attachments, image) = match &post.embed {
        Some(embed) => post_embed_to_as1(embed, &did, pds),
        None => (Vec::new(), Vec::new()),
    };

    let in_reply_to = post
        .reply
        .as_ref()
        .map(|reply| {
            Ok::<_, Error>(vec![Object {
                id: Some(reply.parent.uri.clone()),
                url: at_uri_to_web_url(&reply.parent.uri, None)?,
                ..Default::default()
            }])
        })
        .transpose()?
        .unwrap_or_default();

    Ok(Object {
        object_type: Some(if in_reply_to.is_empty() {
            "note".to_string()
        } else {
            "comment".to_string()
        }),
        id: uri.map(str::to_string),
        url: uri.and_then(|u| at_uri_to_web_url(u, repo_handle).ok().flatten()),
        content: Some(post.text.clone()),
        tags: post
            .facets
            .as_deref()
            .map(|facets| tags_from_facets(&post.text, facets))
            .unwrap_or_default(),
        attachments,
        image,
        author: if did.is_empty() {
            None
        } else {
            Some(Box::new(person_stub_with_handle(&did, repo_handle)))
        },
        in_reply_to,
        published: Some(post.created_at.clone()),
        ..Default::default()
    })
}

fn build_post(
    obj: &Object,
    client: Option<&dyn XrpcClient>,
    blobs: &HashMap<String, Blob>,
) -> Result<Post> {
    let raw = obj
        .content
        .as_deref()
        .or(obj.summary.as_deref())
        .or(obj.display_name.as_deref())
        .unwrap_or_default();
    let all_facets = facets_from_tags(raw, &obj.tags, client)?;

    let (mut text, mut facets, was_truncated) =
        enforce_limit(raw, all_facets.clone(), MAX_POST_GRAPHEMES);
    let mut embed = build_embed(obj, client, blobs)?;

    // Video streams have no embed shape here, but a dropped video must
    // still leave a trace in the link-back affordance.
    let has_video = obj
        .attachments
        .iter()
        .any(|a| a.object_type.as_deref() == Some("video"));

    // A truncated post keeps a way back to the original: an external embed
    // when the embed slot is free, a trailing link otherwise.
    if was_truncated {
        if let Some(url) = obj.url.as_deref() {
            let label = format!("Original post on {}", domain_of(url));
            if embed.is_some() || has_video {
                let marker = if has_video { "[Video] " } else { "" };
                let suffix = format!("\n\n{marker}[{label}]");
                let budget = MAX_POST_GRAPHEMES.saturating_sub(grapheme_count(&suffix));
                let (base, kept, _) = enforce_limit(raw, all_facets, budget);
                let link_start = base.len() + 2;
                text = base + &suffix;
                facets = kept;
                facets.push(Facet::new(
                    link_start,
                    text.len(),
                    FacetFeature::Link {
                        uri: url.to_string(),
                    },
                ));
            } else {
                embed = Some(PostEmbed::External(ExternalEmbed {
                    external: ExternalInfo {
                        uri: url.to_string(),
                        title: label,
                        description: String::new(),
                        thumb: None,
                    },
                }));
            }
        }
    }

    Ok(Post {
        text,
        facets: if facets.is_empty() { None } else { Some(facets) },
        reply: reply_ref(obj, client)?,
        embed,
        created_at: created_at(obj.published.as_deref()),
    })
}

/// Reply pointers for the first resolvable `inReplyTo` entry. The root is
/// inherited from the parent's own reply ref when the parent record is
/// fetched, so deep replies still point at the true thread root.
fn reply_ref(obj: &Object, client: Option<&dyn XrpcClient>) -> Result<Option<ReplyRef>> {
    for parent_obj in &obj.in_reply_to {
        let parent = match resolve_ref(parent_obj, client, true) {
            Ok(r) => r,
            Err(Error::InvalidInput(_)) => continue,
            Err(e) => return Err(e),
        };
        let root = match parent.value.as_deref() {
            Some(Record::Post(p)) => p
                .reply
                .as_ref()
                .map(|r| r.root.clone())
                .unwrap_or_else(|| parent.clone().without_value()),
            _ => parent.clone().without_value(),
        };
        return Ok(Some(ReplyRef {
            root,
            parent: parent.without_value(),
        }));
    }
    Ok(None)
}

fn share_to_record(
    activity: Option<&Activity>,
    obj: &Object,
    out_type: OutType,
    client: Option<&dyn XrpcClient>,
    blobs: &HashMap<String, Blob>,
) -> Result<Record> {
    match out_type {
        OutType::Record => Ok(Record::Repost(Repost {
            subject: resolve_ref(obj, client, false)?.without_value(),
            created_at: created_at(activity.and_then(|a| a.published.as_deref())),
        })),
        OutType::ReasonRepost => Ok(Record::ReasonRepost(reason_repost(activity))),
        OutType::FeedViewPost => {
            let post = build_post(obj, client, blobs)?;
            Ok(Record::FeedViewPost(FeedViewPost {
                post: post_view(post, obj),
                reason: Some(reason_repost(activity)),
            }))
        }
        _ => Err(Error::invalid(format!(
            "share can't produce {out_type:?} output"
        ))),
    }
}

fn reason_repost(activity: Option<&Activity>) -> ReasonRepost {
    ReasonRepost {
        by: activity
            .and_then(|a| a.actor.as_deref())
            .map(object_to_basic)
            .unwrap_or_default(),
        indexed_at: activity.and_then(|a| a.published.clone()),
    }
}

fn person_to_record(obj: &Object, out_type: OutType, blobs: &HashMap<String, Blob>) -> Result<Record> {
    match out_type {
        OutType::Record => Ok(Record::Profile(Profile {
            display_name: obj.display_name.clone(),
            description: obj.summary.clone(),
            avatar: obj
                .image
                .first()
                .and_then(|img| img.url.as_deref())
                .and_then(|url| blob_for_url(url, blobs))
                .cloned(),
            banner: None,
        })),
        OutType::ProfileViewBasic => Ok(Record::ProfileViewBasic(object_to_basic(obj))),
        OutType::ProfileView => Ok(Record::ProfileView(object_to_profile_view(obj))),
        OutType::ProfileViewDetailed => Ok(Record::ProfileViewDetailed(object_to_profile_view(obj))),
        _ => Err(Error::invalid(format!(
            "person can't produce {out_type:?} output"
        ))),
    }
}

fn post_view(post: Post, obj: &Object) -> PostView {
    PostView {
        uri: at_uri_string(obj).unwrap_or_default(),
        cid: None,
        author: obj
            .author
            .as_deref()
            .map(object_to_basic)
            .unwrap_or_default(),
        record: Box::new(Record::Post(post)),
        embed: None,
        reply_count: None,
        repost_count: None,
        like_count: None,
        indexed_at: obj.published.clone(),
    }
}

fn object_to_basic(obj: &Object) -> ProfileViewBasic {
    ProfileViewBasic {
        did: did_of(obj).unwrap_or_default(),
        handle: handle_of(obj).unwrap_or_default(),
        display_name: obj.display_name.clone(),
        avatar: obj.image.first().and_then(|img| img.url.clone()),
    }
}

fn object_to_profile_view(obj: &Object) -> ProfileView {
    ProfileView {
        did: did_of(obj).unwrap_or_default(),
        handle: handle_of(obj).unwrap_or_default(),
        display_name: obj.display_name.clone(),
        description: obj.summary.clone(),
        avatar: obj.image.first().and_then(|img| img.url.clone()),
        banner: None,
        indexed_at: None,
    }
}

fn basic_to_person(view: &ProfileViewBasic) -> Object {
    let ident = match view.handle.as_str() {
        "" => view.did.as_str(),
        h => h,
    };
    Object {
        object_type: Some("person".to_string()),
        id: match view.did.as_str() {
            "" => None,
            d => Some(d.to_string()),
        },
        url: match ident {
            "" => None,
            i => Some(format!("https://{BSKY_APP_HOST}/profile/{i}")),
        },
        display_name: view.display_name.clone(),
        username: match view.handle.as_str() {
            "" => None,
            h => Some(h.to_string()),
        },
        image: view
            .avatar
            .as_deref()
            .map(|url| vec![Image::new(url, None)])
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn view_to_person(view: &ProfileView) -> Object {
    let mut person = basic_to_person(&ProfileViewBasic {
        did: view.did.clone(),
        handle: view.handle.clone(),
        display_name: view.display_name.clone(),
        avatar: view.avatar.clone(),
    });
    person.summary = view.description.clone();
    person
}

fn profile_to_person(
    profile: &Profile,
    repo_did: Option<&str>,
    repo_handle: Option<&str>,
    pds: Option<&str>,
) -> Object {
    let did = repo_did.unwrap_or_default();
    let ident = repo_handle.unwrap_or(did);
    Object {
        object_type: Some("person".to_string()),
        id: match did {
            "" => None,
            d => Some(d.to_string()),
        },
        url: match ident {
            "" => None,
            i => Some(format!("https://{BSKY_APP_HOST}/profile/{i}")),
        },
        display_name: profile.display_name.clone(),
        summary: profile.description.clone(),
        username: repo_handle.map(str::to_string),
        image: profile
            .avatar
            .as_ref()
            .and_then(|blob| blob_read_url(blob, did, pds))
            .map(|url| vec![Image::new(url, None)])
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn person_stub(did: &str) -> Object {
    person_stub_with_handle(did, None)
}

fn person_stub_with_handle(did: &str, handle: Option<&str>) -> Object {
    Object {
        object_type: Some("person".to_string()),
        id: Some(did.to_string()),
        url: Some(format!(
            "https://{BSKY_APP_HOST}/profile/{}",
            handle.unwrap_or(did)
        )),
        username: handle.map(str::to_string),
        ..Default::default()
    }
}

/// A verb applied to a record addressed by AT-URI.
fn subject_activity(verb: &str, uri: &str, published: Option<&str>) -> Result<Activity> {
    Ok(Activity {
        verb: Some(verb.to_string()),
        published: published.map(str::to_string),
        object: Some(Box::new(Object {
            id: Some(uri.to_string()),
            url: at_uri_to_web_url(uri, None)?,
            ..Default::default()
        })),
        ..Default::default()
    })
}

/// The DID an actor-shaped object refers to, resolving a handle over the
/// network when nothing else identifies it.
fn actor_did(obj: &Object, client: Option<&dyn XrpcClient>) -> Result<String> {
    if let Some(did) = did_of(obj) {
        return Ok(did);
    }
    let handle = handle_of(obj)
        .ok_or_else(|| Error::invalid(format!("no DID or handle for actor {:?}", obj.id_or_url())))?;
    let client = client.ok_or_else(|| {
        Error::invalid(format!("can't resolve handle {handle} without a client"))
    })?;
    let resp = client.get("com.atproto.identity.resolveHandle", &[("handle", &handle)])?;
    resp.get("did")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidResponse(format!("no did for handle {handle}")))
}

/// A DID already carried on the object, if any.
fn did_of(obj: &Object) -> Option<String> {
    for candidate in [obj.id.as_deref(), obj.url.as_deref()] {
        if let Some(c) = candidate {
            if is_did(c) {
                return Some(c.to_string());
            }
        }
    }
    let ident = obj.url.as_deref().and_then(bsky_profile_ident)?;
    is_did(&ident).then_some(ident)
}

fn handle_of(obj: &Object) -> Option<String> {
    if let Some(username) = obj.username.as_deref() {
        return Some(username.trim_start_matches('@').to_string());
    }
    let ident = obj.url.as_deref().and_then(bsky_profile_ident)?;
    (!is_did(&ident)).then_some(ident)
}

fn bsky_profile_ident(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if parsed.host_str() != Some(BSKY_APP_HOST) {
        return None;
    }
    parsed
        .path_segments()
        .and_then(|mut s| match (s.next(), s.next()) {
            (Some("profile"), Some(ident)) => Some(ident.to_string()),
            _ => None,
        })
}

/// The AT-URI an object's `id`/`url` points at, as a string.
fn at_uri_string(obj: &Object) -> Option<String> {
    for candidate in [obj.id.as_deref(), obj.url.as_deref()] {
        if let Some(c) = candidate {
            if c.starts_with("at://") {
                return Some(c.to_string());
            }
        }
    }
    obj.url
        .as_deref()
        .and_then(|u| web_url_to_at_uri(u, None, None).ok().flatten())
        .map(|u| u.to_string())
}

fn authority_did(uri: Option<&str>) -> Option<String> {
    let parsed = AtUri::parse(uri?).ok()?;
    is_did(&parsed.authority).then_some(parsed.authority)
}

fn target_object(value: &Value) -> Result<Object> {
    match value {
        Value::String(url) => Ok(Object::from_url(url.clone())),
        Value::Object(_) => Ok(serde_json::from_value(value.clone())?),
        other => Err(Error::invalid(format!("unusable add target: {other}"))),
    }
}

fn expect_record_out(out_type: OutType, verb: &str) -> Result<()> {
    if out_type == OutType::Record {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{verb} can't produce {out_type:?} output"
        )))
    }
}

fn created_at(published: Option<&str>) -> String {
    published
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().to_rfc3339())
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::MediaEmbed;
    use crate::refs::StrongRef;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn embed_has_images(embed: &PostEmbed) -> bool {
        match embed {
            PostEmbed::Images(_) => true,
            PostEmbed::RecordWithMedia(c) => matches!(c.media, MediaEmbed::Images(_)),
            _ => false,
        }
    }

    fn doc(value: serde_json::Value) -> As1 {
        As1::from_json(value).unwrap()
    }

    fn no_blobs() -> HashMap<String, Blob> {
        HashMap::new()
    }

    #[test]
    fn note_becomes_post_record() {
        let record = from_as1(
            &doc(json!({
                "objectType": "note",
                "content": "hello world",
                "published": "2024-01-01T00:00:00Z",
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match record {
            Record::Post(post) => {
                assert_eq!(post.text, "hello world");
                assert_eq!(post.created_at, "2024-01-01T00:00:00Z");
                assert_eq!(post.facets, None);
                assert_eq!(post.embed, None);
            }
            other => panic!("expected post, got {other:?}"),
        }
    }

    #[test]
    fn note_with_hashtag_gets_facets() {
        let record = from_as1(
            &doc(json!({
                "objectType": "note",
                "content": "big #mood today",
                "tags": [{"objectType": "hashtag", "displayName": "mood"}],
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        let Record::Post(post) = record else {
            panic!("expected post")
        };
        let facets = post.facets.unwrap();
        assert_eq!(facets.len(), 1);
        assert_eq!(
            facets[0].features,
            vec![FacetFeature::Tag {
                tag: "mood".to_string()
            }]
        );
    }

    #[test]
    fn long_note_gains_external_link_back() {
        let record = from_as1(
            &doc(json!({
                "objectType": "article",
                "content": "word ".repeat(80),
                "url": "https://example.com/orig/1",
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        let Record::Post(post) = record else {
            panic!("expected post")
        };
        assert!(post.text.ends_with(" […]"));
        assert!(grapheme_count(&post.text) <= MAX_POST_GRAPHEMES);
        match post.embed.unwrap() {
            PostEmbed::External(e) => {
                assert_eq!(e.external.title, "Original post on example.com");
                assert_eq!(e.external.uri, "https://example.com/orig/1");
            }
            other => panic!("expected external embed, got {other:?}"),
        }
    }

    #[test]
    fn long_note_with_image_gets_text_link_back() {
        let mut blobs = HashMap::new();
        blobs.insert(
            "http://pic/1.jpg".to_string(),
            Blob::new("bafyimg", "image/jpeg", 9),
        );
        let record = from_as1(
            &doc(json!({
                "objectType": "note",
                "content": "word ".repeat(80),
                "url": "https://example.com/orig/2",
                "image": ["http://pic/1.jpg"],
            })),
            OutType::Record,
            None,
            &blobs,
        )
        .unwrap();
        let Record::Post(post) = record else {
            panic!("expected post")
        };
        assert!(post.text.ends_with("\n\n[Original post on example.com]"));
        assert!(grapheme_count(&post.text) <= MAX_POST_GRAPHEMES);
        assert!(embed_has_images(&post.embed.unwrap()));

        // The trailing span carries a link facet back to the original.
        let facets = post.facets.unwrap();
        let link = facets.last().unwrap();
        assert_eq!(
            link.features,
            vec![FacetFeature::Link {
                uri: "https://example.com/orig/2".to_string()
            }]
        );
        assert_eq!(
            &post.text[link.index.byte_start..link.index.byte_end],
            "[Original post on example.com]"
        );
    }

    #[test]
    fn dropped_video_marks_the_link_back() {
        // A video attachment has no embed shape, but the truncated text
        // still signals it ahead of the link back to the original.
        let mut blobs = HashMap::new();
        blobs.insert(
            "http://pic/1.jpg".to_string(),
            Blob::new("bafyimg", "image/jpeg", 9),
        );
        let record = from_as1(
            &doc(json!({
                "objectType": "note",
                "content": "word ".repeat(80),
                "url": "https://example.com/orig/3",
                "image": ["http://pic/1.jpg"],
                "attachments": [
                    {"objectType": "video", "stream": {"url": "https://a/cool/vid"}},
                ],
            })),
            OutType::Record,
            None,
            &blobs,
        )
        .unwrap();
        let Record::Post(post) = record else {
            panic!("expected post")
        };
        assert!(post.text.ends_with("\n\n[Video] [Original post on example.com]"));
        assert!(grapheme_count(&post.text) <= MAX_POST_GRAPHEMES);
        assert!(embed_has_images(&post.embed.unwrap()));

        let facets = post.facets.unwrap();
        let link = facets.last().unwrap();
        assert_eq!(
            link.features,
            vec![FacetFeature::Link {
                uri: "https://example.com/orig/3".to_string()
            }]
        );
        assert_eq!(
            &post.text[link.index.byte_start..link.index.byte_end],
            "[Video] [Original post on example.com]"
        );
    }

    #[test]
    fn video_only_note_uses_the_text_link_back() {
        // No image and no quote, so the embed slot is free, but the
        // dropped video still forces the text form of the affordance.
        let record = from_as1(
            &doc(json!({
                "objectType": "note",
                "content": "word ".repeat(80),
                "url": "https://example.com/orig/4",
                "attachments": [
                    {"objectType": "video", "stream": {"url": "https://a/cool/vid"}},
                ],
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        let Record::Post(post) = record else {
            panic!("expected post")
        };
        assert!(post.text.ends_with("\n\n[Video] [Original post on example.com]"));
        assert_eq!(post.embed, None);
    }

    #[test]
    fn share_becomes_repost() {
        let record = from_as1(
            &doc(json!({
                "verb": "share",
                "published": "2024-02-02T00:00:00Z",
                "object": {
                    "uri": "at://did:plc:abc/app.bsky.feed.post/1",
                    "cid": "bafypost",
                },
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match record {
            Record::Repost(repost) => {
                assert_eq!(repost.subject.uri, "at://did:plc:abc/app.bsky.feed.post/1");
                assert_eq!(repost.subject.cid, "bafypost");
                assert_eq!(repost.created_at, "2024-02-02T00:00:00Z");
            }
            other => panic!("expected repost, got {other:?}"),
        }
    }

    #[test]
    fn share_as_reason_repost() {
        let record = from_as1(
            &doc(json!({
                "verb": "share",
                "actor": {"id": "did:plc:bob", "username": "bob.com"},
                "object": {"id": "at://did:plc:abc/app.bsky.feed.post/1"},
            })),
            OutType::ReasonRepost,
            None,
            &no_blobs(),
        )
        .unwrap();
        match record {
            Record::ReasonRepost(reason) => {
                assert_eq!(reason.by.did, "did:plc:bob");
                assert_eq!(reason.by.handle, "bob.com");
            }
            other => panic!("expected reasonRepost, got {other:?}"),
        }
    }

    #[test]
    fn like_follow_block() {
        let like = from_as1(
            &doc(json!({
                "verb": "like",
                "object": {"id": "at://did:plc:abc/app.bsky.feed.post/1"},
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        assert!(matches!(like, Record::Like(_)));

        let follow = from_as1(
            &doc(json!({"verb": "follow", "object": {"id": "did:plc:abc"}})),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match follow {
            Record::Follow(f) => assert_eq!(f.subject, "did:plc:abc"),
            other => panic!("expected follow, got {other:?}"),
        }

        let block = from_as1(
            &doc(json!({
                "verb": "block",
                "object": {"url": "https://bsky.app/profile/did:plc:abc"},
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match block {
            Record::Block(b) => assert_eq!(b.subject, "did:plc:abc"),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn flag_becomes_report_input() {
        let record = from_as1(
            &doc(json!({
                "verb": "flag",
                "content": "this is spam",
                "object": {
                    "uri": "at://did:plc:abc/app.bsky.feed.post/1",
                    "cid": "bafypost",
                },
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match record {
            Record::Report(report) => {
                assert_eq!(report.reason_type, REASON_OTHER);
                assert_eq!(report.reason.as_deref(), Some("this is spam"));
                assert_eq!(report.subject.uri, "at://did:plc:abc/app.bsky.feed.post/1");
            }
            other => panic!("expected report, got {other:?}"),
        }
    }

    #[test]
    fn collection_and_add() {
        let list = from_as1(
            &doc(json!({
                "objectType": "collection",
                "displayName": "cool people",
                "summary": "the best",
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match list {
            Record::List(l) => {
                assert_eq!(l.purpose, CURATE_LIST_PURPOSE);
                assert_eq!(l.name, "cool people");
                assert_eq!(l.description.as_deref(), Some("the best"));
            }
            other => panic!("expected list, got {other:?}"),
        }

        let item = from_as1(
            &doc(json!({
                "verb": "add",
                "object": {"id": "did:plc:abc"},
                "target": {"id": "at://did:plc:me/app.bsky.graph.list/1"},
            })),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap();
        match item {
            Record::ListItem(i) => {
                assert_eq!(i.subject, "did:plc:abc");
                assert_eq!(i.list, "at://did:plc:me/app.bsky.graph.list/1");
            }
            other => panic!("expected listitem, got {other:?}"),
        }
    }

    #[test]
    fn person_to_profile_and_views() {
        let person = json!({
            "objectType": "person",
            "id": "did:plc:abc",
            "username": "alice.com",
            "displayName": "Alice",
            "summary": "hi",
        });
        let profile = from_as1(&doc(person.clone()), OutType::Record, None, &no_blobs()).unwrap();
        match profile {
            Record::Profile(p) => {
                assert_eq!(p.display_name.as_deref(), Some("Alice"));
                assert_eq!(p.description.as_deref(), Some("hi"));
            }
            other => panic!("expected profile, got {other:?}"),
        }

        let view =
            from_as1(&doc(person), OutType::ProfileViewBasic, None, &no_blobs()).unwrap();
        match view {
            Record::ProfileViewBasic(v) => {
                assert_eq!(v.did, "did:plc:abc");
                assert_eq!(v.handle, "alice.com");
            }
            other => panic!("expected profileViewBasic, got {other:?}"),
        }
    }

    #[test]
    fn incompatible_out_type_is_invalid_input() {
        let err = from_as1(
            &doc(json!({"verb": "like", "object": {"id": "at://did:plc:a/app.bsky.feed.post/1"}})),
            OutType::ReasonRepost,
            None,
            &no_blobs(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = from_as1(
            &doc(json!({"verb": "join", "object": {"id": "x"}})),
            OutType::Record,
            None,
            &no_blobs(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn post_record_round_trips_to_object() {
        let record = Record::Post(Post {
            text: "hello #mood".to_string(),
            facets: Some(vec![Facet::new(
                6,
                11,
                FacetFeature::Tag {
                    tag: "mood".to_string(),
                },
            )]),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        });
        let result = to_as1(
            &record,
            Some("at://did:plc:abc/app.bsky.feed.post/123"),
            Some("did:plc:abc"),
            Some("alice.com"),
            None,
        )
        .unwrap();
        let As1::Object(obj) = result else {
            panic!("expected object")
        };
        assert_eq!(obj.object_type.as_deref(), Some("note"));
        assert_eq!(obj.content.as_deref(), Some("hello #mood"));
        assert_eq!(
            obj.id.as_deref(),
            Some("at://did:plc:abc/app.bsky.feed.post/123")
        );
        assert_eq!(
            obj.url.as_deref(),
            Some("https://bsky.app/profile/alice.com/post/123")
        );
        assert_eq!(obj.published.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(obj.tags.len(), 1);
        assert_eq!(obj.tags[0].object_type.as_deref(), Some("hashtag"));
        assert_eq!(obj.author.unwrap().id.as_deref(), Some("did:plc:abc"));
    }

    #[test]
    fn reply_post_becomes_comment() {
        let record = Record::Post(Post {
            text: "agreed".to_string(),
            reply: Some(ReplyRef {
                root: StrongRef::new("at://did:plc:abc/app.bsky.feed.post/1", "bafyroot"),
                parent: StrongRef::new("at://did:plc:abc/app.bsky.feed.post/2", "bafyparent"),
            }),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        });
        let As1::Object(obj) = to_as1(&record, None, None, None, None).unwrap() else {
            panic!("expected object")
        };
        assert_eq!(obj.object_type.as_deref(), Some("comment"));
        assert_eq!(
            obj.in_reply_to[0].id.as_deref(),
            Some("at://did:plc:abc/app.bsky.feed.post/2")
        );
    }

    #[test]
    fn repost_record_becomes_share_activity() {
        let record = Record::Repost(Repost {
            subject: StrongRef::new("at://did:plc:abc/app.bsky.feed.post/1", "bafy"),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        });
        let As1::Activity(activity) = to_as1(&record, None, None, None, None).unwrap() else {
            panic!("expected activity")
        };
        assert_eq!(activity.verb.as_deref(), Some("share"));
        assert_eq!(
            activity.object.unwrap().id.as_deref(),
            Some("at://did:plc:abc/app.bsky.feed.post/1")
        );
    }

    #[test]
    fn feed_view_with_reason_becomes_share() {
        let record: Record = serde_json::from_value(json!({
            "$type": "app.bsky.feed.defs#feedViewPost",
            "post": {
                "uri": "at://did:plc:abc/app.bsky.feed.post/1",
                "author": {"did": "did:plc:abc", "handle": "alice.com"},
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "original",
                    "createdAt": "2024-01-01T00:00:00Z",
                },
            },
            "reason": {
                "by": {"did": "did:plc:bob", "handle": "bob.com"},
                "indexedAt": "2024-01-02T00:00:00Z",
            },
        }))
        .unwrap();
        let As1::Activity(activity) = to_as1(&record, None, None, None, None).unwrap() else {
            panic!("expected activity")
        };
        assert_eq!(activity.verb.as_deref(), Some("share"));
        assert_eq!(activity.actor.unwrap().id.as_deref(), Some("did:plc:bob"));
        let object = activity.object.unwrap();
        assert_eq!(object.content.as_deref(), Some("original"));
        assert_eq!(
            object.author.as_ref().unwrap().username.as_deref(),
            Some("alice.com")
        );
    }

    #[test]
    fn blocked_post_becomes_placeholder() {
        let record: Record = serde_json::from_value(json!({
            "$type": "app.bsky.feed.defs#blockedPost",
            "uri": "at://did:plc:abc/app.bsky.feed.post/9",
            "blocked": true,
        }))
        .unwrap();
        let As1::Object(obj) = to_as1(&record, None, None, None, None).unwrap() else {
            panic!("expected object")
        };
        assert_eq!(obj.object_type.as_deref(), Some("note"));
        assert_eq!(obj.blocked, Some(true));
        assert_eq!(obj.id.as_deref(), Some("at://did:plc:abc/app.bsky.feed.post/9"));
    }

    #[test]
    fn profile_view_becomes_person() {
        let record: Record = serde_json::from_value(json!({
            "$type": "app.bsky.actor.defs#profileView",
            "did": "did:plc:abc",
            "handle": "alice.com",
            "displayName": "Alice",
            "description": "hi there",
            "avatar": "https://cdn/avatar.jpg",
        }))
        .unwrap();
        let As1::Object(person) = to_as1(&record, None, None, None, None).unwrap() else {
            panic!("expected object")
        };
        assert_eq!(person.object_type.as_deref(), Some("person"));
        assert_eq!(person.id.as_deref(), Some("did:plc:abc"));
        assert_eq!(person.username.as_deref(), Some("alice.com"));
        assert_eq!(person.summary.as_deref(), Some("hi there"));
        assert_eq!(
            person.url.as_deref(),
            Some("https://bsky.app/profile/alice.com")
        );
        assert_eq!(person.image[0].url.as_deref(), Some("https://cdn/avatar.jpg"));
    }
}
