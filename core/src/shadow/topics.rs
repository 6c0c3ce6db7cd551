//! Shadow topic layout
//!
//! Classic (unnamed) device shadow:
//!
//! - `$aws/things/{thing}/shadow/get` - request the full document
//! - `$aws/things/{thing}/shadow/get/accepted` - document response
//! - `$aws/things/{thing}/shadow/update` - reported-state updates

use hal_abstractions::MAX_TOPIC_LEN;
use heapless::String;

use crate::error::TopicError;

pub type Topic = String<MAX_TOPIC_LEN>;

const SHADOW_PREFIX: &str = "$aws/things/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    pub get: Topic,
    pub get_accepted: Topic,
    pub update: Topic,
}

impl ShadowTopics {
    pub fn new(thing_name: &str) -> Result<Self, TopicError> {
        if thing_name.is_empty() || thing_name.contains('/') {
            error!("Thing name must be a single non-empty topic level");
            return Err(TopicError::InvalidCharacter);
        }
        Ok(Self {
            get: format_shadow_topic(thing_name, "get")?,
            get_accepted: format_shadow_topic(thing_name, "get/accepted")?,
            update: format_shadow_topic(thing_name, "update")?,
        })
    }
}

/// Reject topic names a broker would refuse for PUBLISH
///
/// MQTT topic names cannot contain wildcards (`+`, `#`) or NUL.
pub fn check_topic_name(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() || topic.contains(['+', '#', '\0']) {
        error!("Topic contains invalid MQTT topic characters");
        return Err(TopicError::InvalidCharacter);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong);
    }
    Ok(())
}

/// Build `$aws/things/{thing_name}/shadow/{suffix}`
fn format_shadow_topic(thing_name: &str, suffix: &str) -> Result<Topic, TopicError> {
    check_topic_name(thing_name)?;
    check_topic_name(suffix)?;

    let mut topic = Topic::new();
    topic
        .push_str(SHADOW_PREFIX)
        .map_err(|_| TopicError::TooLong)?;
    topic
        .push_str(thing_name)
        .map_err(|_| TopicError::TooLong)?;
    topic
        .push_str("/shadow/")
        .map_err(|_| TopicError::TooLong)?;
    topic.push_str(suffix).map_err(|_| TopicError::TooLong)?;

    Ok(topic)
}
