//! End-to-end feed orchestration against a canned XRPC client.

use std::cell::RefCell;
use std::collections::HashMap;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use skybridge::{Error, GetActivitiesOptions, Result, XrpcClient, get_activities};

/// Serves fixed responses and counts calls per method.
struct CannedClient {
    responses: HashMap<String, Value>,
    calls: RefCell<Vec<String>>,
}

impl CannedClient {
    fn new(responses: Vec<(&str, Value)>) -> Self {
        CannedClient {
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

impl XrpcClient for CannedClient {
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

const POST_URI: &str = "at://did:plc:abc/app.bsky.feed.post/1";

fn timeline_with_likes(like_count: u64) -> Vec<(&'static str, Value)> {
    vec![
        (
            "app.bsky.feed.getTimeline",
            json!({"feed": [{
                "post": {
                    "uri": POST_URI,
                    "author": {"did": "did:plc:abc", "handle": "alice.com"},
                    "record": {
                        "$type": "app.bsky.feed.post",
                        "text": "a popular post",
                        "createdAt": "2024-01-01T00:00:00Z",
                    },
                    "likeCount": like_count,
                },
            }]}),
        ),
        (
            "app.bsky.feed.getLikes",
            json!({"likes": [
                {"actor": {"did": "did:plc:bob", "handle": "bob.com", "displayName": "Bob"}},
                {"actor": {"did": "did:plc:eve", "handle": "eve.com"}},
            ]}),
        ),
    ]
}

#[test]
fn repeated_enrichment_is_served_from_cache() {
    let client = CannedClient::new(timeline_with_likes(2));
    let opts = GetActivitiesOptions {
        fetch_likes: true,
        ..Default::default()
    };
    let mut cache: HashMap<String, u64> = HashMap::new();

    let first = get_activities(&client, &opts, Some(&mut cache)).unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 1);
    assert_eq!(first[0].object.as_ref().unwrap().tags.len(), 2);

    // The cached like count matches the item's current count, so the
    // second pass issues no likes fetch.
    let second = get_activities(&client, &opts, Some(&mut cache)).unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 1);
    assert_eq!(second[0].object.as_ref().unwrap().tags.len(), 0);

    assert_eq!(cache.get(&format!("likes:{POST_URI}")), Some(&2));
}

#[test]
fn count_change_invalidates_the_cache_entry() {
    let opts = GetActivitiesOptions {
        fetch_likes: true,
        ..Default::default()
    };
    let mut cache: HashMap<String, u64> = HashMap::new();

    let client = CannedClient::new(timeline_with_likes(2));
    get_activities(&client, &opts, Some(&mut cache)).unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 1);

    // A new like arrives; the count no longer matches and the fetch runs.
    let client = CannedClient::new(timeline_with_likes(3));
    get_activities(&client, &opts, Some(&mut cache)).unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 1);
    assert_eq!(cache.get(&format!("likes:{POST_URI}")), Some(&3));
}

#[test]
fn uncached_calls_enrich_every_pass() {
    let client = CannedClient::new(timeline_with_likes(2));
    let opts = GetActivitiesOptions {
        fetch_likes: true,
        ..Default::default()
    };

    get_activities(&client, &opts, None).unwrap();
    get_activities(&client, &opts, None).unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getLikes"), 2);
}
