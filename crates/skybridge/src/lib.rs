//! Bidirectional conversion between AS1 activity documents and AT
//! Protocol records, plus the network orchestration to read, write, and
//! enrich a feed.
//!
//! ## Features
//!
//! - **Record mapper**: `from_as1` / `to_as1` over the supported `$type` set
//! - **Rich text**: byte-exact facet extraction and synthesis
//! - **Truncation**: grapheme-bounded post limits with facet rewriting
//! - **Feed orchestration**: timeline/thread reads with cached enrichment
//! - **Transport**: an injected `XrpcClient` trait and a blocking PDS client

pub mod as1;
pub mod blob;
pub mod client;
pub mod convert;
pub mod embed;
mod error;
pub mod facet;
pub mod feed;
pub mod records;
pub mod refs;
pub mod thread;
pub mod truncate;
pub mod uri;

pub use as1::{Activity, As1, Collection, Image, Object, Tag};
pub use blob::{Blob, DEFAULT_PDS, blob_for_url, blob_read_url};
pub use client::{PdsClient, Session, XrpcClient};
pub use convert::{OutType, from_as1, to_as1};
pub use embed::{EmbedView, PostEmbed, build_embed};
pub use error::{Error, Result};
pub use facet::{ByteSlice, Facet, FacetFeature, facets_from_tags, tags_from_facets};
pub use feed::{EnrichmentCache, GetActivitiesOptions, SELF_GROUP, get_activities};
pub use records::*;
pub use refs::{StrongRef, resolve_ref};
pub use thread::thread_to_as1;
pub use truncate::{MAX_POST_GRAPHEMES, enforce_limit, grapheme_count};
pub use uri::{AtUri, at_uri_to_web_url, did_web_to_url, url_to_did_web, web_url_to_at_uri};
