//! Reply-thread reconstruction: a nested `threadViewPost` tree becomes a
//! single root activity with recursively expanded `replies`.

use crate::as1::{Activity, As1, Collection, Object};
use crate::convert::{blocked_placeholder, post_view_to_object};
use crate::error::Result;
use crate::records::{ThreadItem, ThreadViewPost};

/// Convert a thread tree into one root activity. Replies keep the order
/// the protocol returned them; blocked replies become placeholders and
/// not-found replies are dropped.
pub fn thread_to_as1(thread: &ThreadViewPost, pds: Option<&str>) -> Result<As1> {
    let root = thread_node(thread, pds)?;
    Ok(As1::Activity(Activity::wrapping("post", root)))
}

fn thread_node(node: &ThreadViewPost, pds: Option<&str>) -> Result<Object> {
    let mut object = post_view_to_object(&node.post, pds)?;

    let mut items = Vec::new();
    for reply in &node.replies {
        match reply {
            ThreadItem::ThreadViewPost(child) => items.push(thread_node(child, pds)?),
            ThreadItem::BlockedPost(blocked) => items.push(blocked_placeholder(&blocked.uri)),
            ThreadItem::NotFoundPost(_) => continue,
        }
    }
    if !items.is_empty() {
        object.replies = Some(Collection {
            total_items: Some(items.len() as u64),
            items,
        });
    }
    Ok(object)
}
