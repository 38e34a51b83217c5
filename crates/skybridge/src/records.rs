//! Typed protocol records, their read-only view wrappers, and collection
//! NSID constants.
//!
//! The [`Record`] enum is the closed registry of `$type` values the
//! conversion engine understands; adding a record kind means adding a
//! variant here and a dispatch arm in `convert`.

use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::embed::{EmbedView, PostEmbed};
use crate::facet::Facet;
use crate::refs::StrongRef;

/// Bluesky post records.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Bluesky repost records.
pub const REPOST_COLLECTION: &str = "app.bsky.feed.repost";

/// Bluesky like records.
pub const LIKE_COLLECTION: &str = "app.bsky.feed.like";

/// Bluesky follow records.
pub const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";

/// Bluesky block records.
pub const BLOCK_COLLECTION: &str = "app.bsky.graph.block";

/// Bluesky list records.
pub const LIST_COLLECTION: &str = "app.bsky.graph.list";

/// Bluesky list item records.
pub const LIST_ITEM_COLLECTION: &str = "app.bsky.graph.listitem";

/// Bluesky feed generator records.
pub const GENERATOR_COLLECTION: &str = "app.bsky.feed.generator";

/// Bluesky actor profile records.
pub const PROFILE_COLLECTION: &str = "app.bsky.actor.profile";

/// List purpose for curation lists.
pub const CURATE_LIST_PURPOSE: &str = "app.bsky.graph.defs#curatelist";

/// Catch-all moderation report reason.
pub const REASON_OTHER: &str = "com.atproto.moderation.defs#reasonOther";

/// A protocol record or view wrapper, discriminated by `$type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Record {
    #[serde(rename = "app.bsky.feed.post")]
    Post(Post),
    #[serde(rename = "app.bsky.feed.repost")]
    Repost(Repost),
    #[serde(rename = "app.bsky.feed.like")]
    Like(Like),
    #[serde(rename = "app.bsky.graph.follow")]
    Follow(Follow),
    #[serde(rename = "app.bsky.graph.block")]
    Block(Block),
    #[serde(rename = "app.bsky.graph.list")]
    List(List),
    #[serde(rename = "app.bsky.graph.listitem")]
    ListItem(ListItem),
    #[serde(rename = "app.bsky.feed.generator")]
    Generator(Generator),
    #[serde(rename = "app.bsky.actor.profile")]
    Profile(Profile),
    #[serde(rename = "com.atproto.moderation.createReport#input")]
    Report(ReportInput),

    // Read-only view wrappers.
    #[serde(rename = "app.bsky.feed.defs#postView")]
    PostView(PostView),
    #[serde(rename = "app.bsky.feed.defs#feedViewPost")]
    FeedViewPost(FeedViewPost),
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    ThreadViewPost(ThreadViewPost),
    #[serde(rename = "app.bsky.feed.defs#reasonRepost")]
    ReasonRepost(ReasonRepost),
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    BlockedPost(BlockedPost),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFoundPost(NotFoundPost),
    #[serde(rename = "app.bsky.actor.defs#profileView")]
    ProfileView(ProfileView),
    #[serde(rename = "app.bsky.actor.defs#profileViewBasic")]
    ProfileViewBasic(ProfileViewBasic),
    #[serde(rename = "app.bsky.actor.defs#profileViewDetailed")]
    ProfileViewDetailed(ProfileView),
}

impl Record {
    /// The collection a writable record belongs to. Views and report
    /// inputs are not repository records and return `None`.
    pub fn collection(&self) -> Option<&'static str> {
        match self {
            Record::Post(_) => Some(POST_COLLECTION),
            Record::Repost(_) => Some(REPOST_COLLECTION),
            Record::Like(_) => Some(LIKE_COLLECTION),
            Record::Follow(_) => Some(FOLLOW_COLLECTION),
            Record::Block(_) => Some(BLOCK_COLLECTION),
            Record::List(_) => Some(LIST_COLLECTION),
            Record::ListItem(_) => Some(LIST_ITEM_COLLECTION),
            Record::Generator(_) => Some(GENERATOR_COLLECTION),
            Record::Profile(_) => Some(PROFILE_COLLECTION),
            _ => None,
        }
    }
}

/// `app.bsky.feed.post`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<PostEmbed>,
    pub created_at: String,
}

/// Reply pointers: the thread root and the direct parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// `app.bsky.feed.repost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repost {
    pub subject: StrongRef,
    pub created_at: String,
}

/// `app.bsky.feed.like`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub subject: StrongRef,
    pub created_at: String,
}

/// `app.bsky.graph.follow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    /// DID of the followed actor.
    pub subject: String,
    pub created_at: String,
}

/// `app.bsky.graph.block`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// DID of the blocked actor.
    pub subject: String,
    pub created_at: String,
}

/// `app.bsky.graph.list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub purpose: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
}

/// `app.bsky.graph.listitem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    /// DID of the listed actor.
    pub subject: String,
    /// AT-URI of the list.
    pub list: String,
    pub created_at: String,
}

/// `app.bsky.feed.generator`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
}

/// `app.bsky.actor.profile`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Blob>,
}

/// Input body for `com.atproto.moderation.createReport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub reason_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub subject: ReportSubject,
}

/// The strong-ref subject of a moderation report, which carries its own
/// `$type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSubject {
    #[serde(rename = "$type")]
    pub kind: String,
    pub uri: String,
    pub cid: String,
}

impl From<StrongRef> for ReportSubject {
    fn from(r: StrongRef) -> Self {
        ReportSubject {
            kind: "com.atproto.repo.strongRef".to_string(),
            uri: r.uri,
            cid: r.cid,
        }
    }
}

/// `app.bsky.actor.defs#profileViewBasic`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileViewBasic {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// `app.bsky.actor.defs#profileView` / `#profileViewDetailed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileView {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

/// `app.bsky.feed.defs#postView`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    pub author: ProfileViewBasic,
    /// The underlying post record, `$type` included.
    pub record: Box<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repost_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

/// `app.bsky.feed.defs#feedViewPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    pub post: PostView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonRepost>,
}

/// `app.bsky.feed.defs#reasonRepost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRepost {
    pub by: ProfileViewBasic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

/// `app.bsky.feed.defs#threadViewPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadViewPost {
    pub post: PostView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ThreadItem>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<ThreadItem>,
}

/// One node in a reply thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ThreadItem {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    ThreadViewPost(Box<ThreadViewPost>),
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    BlockedPost(BlockedPost),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFoundPost(NotFoundPost),
}

/// `app.bsky.feed.defs#blockedPost`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockedPost {
    pub uri: String,
    pub blocked: bool,
}

/// `app.bsky.feed.defs#notFoundPost`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotFoundPost {
    pub uri: String,
    pub not_found: bool,
}
