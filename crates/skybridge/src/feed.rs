//! Feed orchestration: timeline/author-feed/thread reads, mapped to AS1
//! and optionally enriched with reply, like, and repost detail.

use serde_json::Value;
use tracing::debug;

use crate::as1::{Activity, As1, Object, Tag};
use crate::client::XrpcClient;
use crate::convert::to_as1;
use crate::error::{Error, Result};
use crate::records::{FeedViewPost, ProfileView, Record, ThreadItem};
use crate::thread::thread_to_as1;
use crate::uri::web_url_to_at_uri;

/// Group id selecting the authenticated user's own feed.
pub const SELF_GROUP: &str = "@self";

/// Caller-owned memory of enrichment counts, keyed by a kind prefix plus
/// the item's canonical URI. The orchestrator skips an enrichment fetch
/// when the cached count equals the item's current count, always writes
/// the observed count back, and never evicts.
pub trait EnrichmentCache {
    fn get(&self, key: &str) -> Option<u64>;
    fn put(&mut self, key: &str, count: u64);
}

impl EnrichmentCache for std::collections::HashMap<String, u64> {
    fn get(&self, key: &str) -> Option<u64> {
        std::collections::HashMap::get(self, key).copied()
    }

    fn put(&mut self, key: &str, count: u64) {
        self.insert(key.to_string(), count);
    }
}

/// Selection and enrichment options for [`get_activities`].
#[derive(Debug, Clone, Default)]
pub struct GetActivitiesOptions {
    /// Actor whose feed to read when `group_id` is [`SELF_GROUP`].
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    /// A single post (AT-URI or web URL) to read as a thread.
    pub activity_id: Option<String>,
    pub fetch_replies: bool,
    pub fetch_likes: bool,
    pub fetch_shares: bool,
    pub count: Option<usize>,
}

/// Read activities from the network and map them to AS1.
///
/// `activity_id` selects a single thread via `getPostThread`; a
/// [`SELF_GROUP`] group selects the author feed; anything else reads the
/// home timeline. Enrichment issues at most one extra call per item per
/// requested kind, moderated by `cache`.
pub fn get_activities(
    client: &dyn XrpcClient,
    opts: &GetActivitiesOptions,
    mut cache: Option<&mut dyn EnrichmentCache>,
) -> Result<Vec<Activity>> {
    if let Some(id) = opts.activity_id.as_deref() {
        return thread_activities(client, opts, cache.as_deref_mut(), id);
    }

    let limit = opts.count.map(|c| c.to_string());
    let mut params: Vec<(&str, &str)> = Vec::new();
    if let Some(limit) = limit.as_deref() {
        params.push(("limit", limit));
    }

    let resp = if opts.group_id.as_deref() == Some(SELF_GROUP) {
        let actor = opts
            .user_id
            .as_deref()
            .ok_or_else(|| Error::invalid("author feed requires a user id"))?;
        params.push(("actor", actor));
        client.get("app.bsky.feed.getAuthorFeed", &params)?
    } else {
        client.get("app.bsky.feed.getTimeline", &params)?
    };

    let items = resp
        .get("feed")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    debug!(items = items.len(), "fetched feed page");

    let mut activities = Vec::with_capacity(items.len());
    for item in items {
        let view: FeedViewPost = serde_json::from_value(item)?;
        let uri = view.post.uri.clone();
        let counts = Counts::of(&view);

        let mut activity = match to_as1(&Record::FeedViewPost(view), None, None, None, None)? {
            As1::Activity(a) => a,
            As1::Object(o) => Activity::wrapping("post", o),
        };
        if let Some(object) = activity.object.as_deref_mut() {
            enrich(client, opts, cache.as_deref_mut(), object, &uri, counts)?;
        }
        activities.push(activity);
    }
    Ok(activities)
}

fn thread_activities(
    client: &dyn XrpcClient,
    opts: &GetActivitiesOptions,
    cache: Option<&mut (dyn EnrichmentCache + '_)>,
    id: &str,
) -> Result<Vec<Activity>> {
    let uri = canonical_uri(id)?;
    let resp = client.get("app.bsky.feed.getPostThread", &[("uri", &uri)])?;
    let thread: ThreadItem = serde_json::from_value(
        resp.get("thread")
            .cloned()
            .ok_or_else(|| Error::InvalidResponse("getPostThread returned no thread".to_string()))?,
    )?;

    let ThreadItem::ThreadViewPost(node) = thread else {
        return Ok(Vec::new());
    };
    let counts = Counts {
        replies: node.post.reply_count.unwrap_or_default(),
        likes: node.post.like_count.unwrap_or_default(),
        shares: node.post.repost_count.unwrap_or_default(),
    };

    let As1::Activity(mut activity) = thread_to_as1(&node, None)? else {
        return Err(Error::InvalidResponse("thread did not map to an activity".to_string()));
    };
    if let Some(object) = activity.object.as_deref_mut() {
        // Replies already came with the thread; only likes/shares remain.
        let opts = GetActivitiesOptions {
            fetch_replies: false,
            ..opts.clone()
        };
        enrich(client, &opts, cache, object, &uri, counts)?;
    }
    Ok(vec![activity])
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    replies: u64,
    likes: u64,
    shares: u64,
}

impl Counts {
    fn of(view: &FeedViewPost) -> Counts {
        Counts {
            replies: view.post.reply_count.unwrap_or_default(),
            likes: view.post.like_count.unwrap_or_default(),
            shares: view.post.repost_count.unwrap_or_default(),
        }
    }
}

fn enrich(
    client: &dyn XrpcClient,
    opts: &GetActivitiesOptions,
    mut cache: Option<&mut (dyn EnrichmentCache + '_)>,
    object: &mut Object,
    uri: &str,
    counts: Counts,
) -> Result<()> {
    if opts.fetch_replies && should_fetch(cache.as_deref_mut(), "replies", uri, counts.replies) {
        let resp = client.get("app.bsky.feed.getPostThread", &[("uri", uri)])?;
        if let Some(thread) = resp.get("thread").cloned() {
            if let Ok(ThreadItem::ThreadViewPost(node)) = serde_json::from_value(thread) {
                if let As1::Activity(a) = thread_to_as1(&node, None)? {
                    object.replies = a.object.and_then(|o| o.replies);
                }
            }
        }
    }

    if opts.fetch_likes && should_fetch(cache.as_deref_mut(), "likes", uri, counts.likes) {
        let resp = client.get("app.bsky.feed.getLikes", &[("uri", uri)])?;
        let likes = resp
            .get("likes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for like in likes {
            if let Some(actor) = like.get("actor") {
                object.tags.push(actor_tag("like", actor.clone())?);
            }
        }
    }

    if opts.fetch_shares && should_fetch(cache.as_deref_mut(), "shares", uri, counts.shares) {
        let resp = client.get("app.bsky.feed.getRepostedBy", &[("uri", uri)])?;
        let reposters = resp
            .get("repostedBy")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for actor in reposters {
            object.tags.push(actor_tag("share", actor.clone())?);
        }
    }

    Ok(())
}

/// Consult and update the cache for one enrichment kind. A fetch is
/// skipped when nothing exists to fetch or the cached count is current;
/// the observed count is recorded either way.
fn should_fetch(
    cache: Option<&mut (dyn EnrichmentCache + '_)>,
    kind: &str,
    uri: &str,
    current: u64,
) -> bool {
    let Some(cache) = cache else {
        return current > 0;
    };
    let key = format!("{kind}:{uri}");
    let cached = cache.get(&key);
    cache.put(&key, current);
    if current == 0 {
        return false;
    }
    cached != Some(current)
}

/// An actor's like/share rendered as an activity tag on the object.
fn actor_tag(verb: &str, actor: Value) -> Result<Tag> {
    let view: ProfileView = serde_json::from_value(actor)?;
    let As1::Object(person) = to_as1(&Record::ProfileView(view), None, None, None, None)? else {
        return Err(Error::InvalidResponse("profile view did not map to a person".to_string()));
    };

    let mut tag = Tag {
        object_type: Some("activity".to_string()),
        url: person.url.clone(),
        display_name: person.display_name.clone(),
        ..Default::default()
    };
    tag.extra
        .insert("verb".to_string(), Value::String(verb.to_string()));
    tag.extra
        .insert("actor".to_string(), serde_json::to_value(&person)?);
    Ok(tag)
}

fn canonical_uri(id: &str) -> Result<String> {
    if id.starts_with("at://") {
        return Ok(id.to_string());
    }
    web_url_to_at_uri(id, None, None)?
        .map(|uri| uri.to_string())
        .ok_or_else(|| Error::invalid(format!("not a post identifier: {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Canned-response client that records every query it serves.
    struct FakeClient {
        responses: HashMap<String, Value>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeClient {
        fn new(responses: Vec<(&str, Value)>) -> Self {
            FakeClient {
                responses: responses
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls_to(&self, nsid: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == nsid).count()
        }
    }

    impl XrpcClient for FakeClient {
        fn get(&self, nsid: &str, _params: &[(&str, &str)]) -> Result<Value> {
            self.calls.borrow_mut().push(nsid.to_string());
            self.responses
                .get(nsid)
                .cloned()
                .ok_or_else(|| Error::InvalidResponse(format!("unexpected call: {nsid}")))
        }

        fn post(&self, nsid: &str, _body: &Value) -> Result<Value> {
            Err(Error::InvalidResponse(format!("unexpected post: {nsid}")))
        }
    }

    fn feed_item(rkey: &str, text: &str, like_count: u64) -> Value {
        json!({
            "post": {
                "uri": format!("at://did:plc:abc/app.bsky.feed.post/{rkey}"),
                "author": {"did": "did:plc:abc", "handle": "alice.com"},
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": text,
                    "createdAt": "2024-01-01T00:00:00Z",
                },
                "likeCount": like_count,
            },
        })
    }

    #[test]
    fn timeline_maps_to_post_activities() {
        let client = FakeClient::new(vec![(
            "app.bsky.feed.getTimeline",
            json!({"feed": [feed_item("1", "first", 0), feed_item("2", "second", 0)]}),
        )]);
        let activities =
            get_activities(&client, &GetActivitiesOptions::default(), None).unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].verb.as_deref(), Some("post"));
        assert_eq!(
            activities[0].object.as_ref().unwrap().content.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn self_group_reads_author_feed() {
        let client = FakeClient::new(vec![(
            "app.bsky.feed.getAuthorFeed",
            json!({"feed": []}),
        )]);
        let opts = GetActivitiesOptions {
            group_id: Some(SELF_GROUP.to_string()),
            user_id: Some("alice.com".to_string()),
            ..Default::default()
        };
        assert_eq!(get_activities(&client, &opts, None).unwrap(), vec![]);
        assert_eq!(client.calls_to("app.bsky.feed.getAuthorFeed"), 1);
        assert_eq!(client.calls_to("app.bsky.feed.getTimeline"), 0);
    }

    #[test]
    fn self_group_without_user_is_invalid() {
        let client = FakeClient::new(vec![]);
        let opts = GetActivitiesOptions {
            group_id: Some(SELF_GROUP.to_string()),
            ..Default::default()
        };
        assert!(matches!(
            get_activities(&client, &opts, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn activity_id_reads_a_thread() {
        let client = FakeClient::new(vec![(
            "app.bsky.feed.getPostThread",
            json!({"thread": {
                "$type": "app.bsky.feed.defs#threadViewPost",
                "post": feed_item("9", "threaded", 0)["post"].clone(),
            }}),
        )]);
        let opts = GetActivitiesOptions {
            activity_id: Some("https://bsky.app/profile/did:plc:abc/post/9".to_string()),
            ..Default::default()
        };
        let activities = get_activities(&client, &opts, None).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(
            activities[0].object.as_ref().unwrap().content.as_deref(),
            Some("threaded")
        );
    }

    #[test]
    fn likes_enrichment_adds_actor_tags() {
        let client = FakeClient::new(vec![
            (
                "app.bsky.feed.getTimeline",
                json!({"feed": [feed_item("1", "liked post", 1)]}),
            ),
            (
                "app.bsky.feed.getLikes",
                json!({"likes": [{
                    "actor": {"did": "did:plc:bob", "handle": "bob.com", "displayName": "Bob"},
                    "createdAt": "2024-01-02T00:00:00Z",
                }]}),
            ),
        ]);
        let opts = GetActivitiesOptions {
            fetch_likes: true,
            ..Default::default()
        };
        let activities = get_activities(&client, &opts, None).unwrap();
        let tags = &activities[0].object.as_ref().unwrap().tags;
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].object_type.as_deref(), Some("activity"));
        assert_eq!(tags[0].extra.get("verb"), Some(&json!("like")));
        assert_eq!(tags[0].display_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn zero_count_skips_enrichment_call() {
        let client = FakeClient::new(vec![(
            "app.bsky.feed.getTimeline",
            json!({"feed": [feed_item("1", "unliked", 0)]}),
        )]);
        let opts = GetActivitiesOptions {
            fetch_likes: true,
            ..Default::default()
        };
        get_activities(&client, &opts, None).unwrap();
        assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 0);
    }

    #[test]
    fn cache_records_observed_counts() {
        let mut cache: HashMap<String, u64> = HashMap::new();
        assert!(should_fetch(Some(&mut cache), "likes", "at://x", 3));
        assert_eq!(
            EnrichmentCache::get(&cache, "likes:at://x"),
            Some(3)
        );
        // Current count unchanged: nothing new to fetch.
        assert!(!should_fetch(Some(&mut cache), "likes", "at://x", 3));
        // Count moved: fetch again.
        assert!(should_fetch(Some(&mut cache), "likes", "at://x", 5));
    }
}
