//! The AS1 activity/object document model.
//!
//! AS1 documents are open, string-keyed mappings. The model here keeps the
//! recognized keys as typed fields and carries everything else through an
//! `extra` side map, so unknown keys survive a round trip.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// An AS1 document: either an activity (has a `verb`) or a bare object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum As1 {
    Activity(Activity),
    Object(Object),
}

impl As1 {
    /// Classify and parse a JSON document.
    ///
    /// A document with a `verb` key, or `objectType: "activity"`, is an
    /// activity; anything else is an object.
    pub fn from_json(value: Value) -> Result<As1> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::invalid("AS1 document must be a JSON object"))?;

        let is_activity = map.contains_key("verb")
            || map.get("objectType").and_then(Value::as_str) == Some("activity");

        if is_activity {
            Ok(As1::Activity(serde_json::from_value(value)?))
        } else {
            Ok(As1::Object(serde_json::from_value(value)?))
        }
    }

    /// Serialize back to a JSON document.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The inner object: an activity's `object`, or the document itself.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            As1::Activity(a) => a.object.as_deref(),
            As1::Object(o) => Some(o),
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            As1::Activity(a) => Some(a),
            As1::Object(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for As1 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        As1::from_json(value).map_err(serde::de::Error::custom)
    }
}

/// An AS1 activity: a verb applied by an actor to an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "object_or_url")]
    pub actor: Option<Box<Object>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "object_or_url")]
    pub object: Option<Box<Object>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Wrap an object in a minimal activity with the given verb.
    pub fn wrapping(verb: &str, object: Object) -> Self {
        Activity {
            verb: Some(verb.to_string()),
            id: object.id.clone(),
            url: object.url.clone(),
            actor: object.author.clone(),
            published: object.published.clone(),
            object: Some(Box::new(object)),
            ..Default::default()
        }
    }
}

/// An AS1 object: note, article, comment, person, collection and friends,
/// discriminated by `objectType`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Object {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub attachments: Vec<Object>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub image: Vec<Image>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "object_or_url")]
    pub author: Option<Box<Object>>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "objects_or_urls")]
    pub in_reply_to: Vec<Object>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Collection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Object {
    /// An object holding only a URL, as produced for string-valued fields.
    pub fn from_url(url: impl Into<String>) -> Self {
        Object {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// The best identifier for reference resolution: `id` then `url`.
    pub fn id_or_url(&self) -> Option<&str> {
        self.id.as_deref().or(self.url.as_deref())
    }
}

/// An AS1 tag: a mention, hashtag, or link annotation on an object, with
/// optional character-offset anchoring into the rendered content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Character (not byte) offset into the rendered content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    /// Length in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A collection of objects, used for `replies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Collection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Object>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
}

/// An image reference with optional alt text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Alt text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Image {
    pub fn new(url: impl Into<String>, alt: Option<String>) -> Self {
        Image {
            url: Some(url.into()),
            display_name: alt,
        }
    }
}

// AS1 sources emit images as bare URL strings or as objects.
impl<'de> Deserialize<'de> for Image {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Url(String),
            Full {
                #[serde(default)]
                url: Option<String>,
                #[serde(default, rename = "displayName")]
                display_name: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Url(url) => Image {
                url: Some(url),
                display_name: None,
            },
            Repr::Full { url, display_name } => Image { url, display_name },
        })
    }
}

/// Accept a single value or a list; missing and null both mean empty.
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(x)) => vec![x],
    })
}

/// Accept a full object or a bare URL string.
fn object_or_url<'de, D>(deserializer: D) -> std::result::Result<Option<Box<Object>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Url(String),
        Obj(Object),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        None => None,
        Some(Repr::Url(url)) => Some(Box::new(Object::from_url(url))),
        Some(Repr::Obj(o)) => Some(Box::new(o)),
    })
}

/// Accept one or many of object-or-URL, for `inReplyTo`.
fn objects_or_urls<'de, D>(deserializer: D) -> std::result::Result<Vec<Object>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Url(String),
        Obj(Object),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Repr>),
        One(Repr),
    }

    let items = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(x)) => vec![x],
    };

    Ok(items
        .into_iter()
        .map(|r| match r {
            Repr::Url(url) => Object::from_url(url),
            Repr::Obj(o) => o,
        })
        .collect())
}
