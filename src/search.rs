//! Depth-first search over untyped JSON trees.
//!
//! Browse responses nest the interesting bits (video ids, continuation tokens)
//! at depths and under renderer names that change without notice, so rather
//! than modelling the schema we walk the whole tree. [`walk_objects`] is the
//! single traversal; the extractor and locator below are visitors on top of it.

use std::collections::HashSet;
use std::ops::ControlFlow;

use serde_json::{Map, Value};

use crate::metadata::VIDEO_ID_LEN;

/// Visits every object in `root` in pre-order, children left to right, until
/// the visitor breaks.
///
/// Uses an explicit stack so arbitrarily deep documents cannot overflow the
/// call stack. Scalars are skipped.
pub fn walk_objects<'a, B>(
    root: &'a Value,
    mut visit: impl FnMut(&'a Map<String, Value>) -> ControlFlow<B>,
) -> Option<B> {
    let mut stack: Vec<&'a Value> = vec![root];
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if let ControlFlow::Break(found) = visit(map) {
                    return Some(found);
                }
                stack.extend(map.values().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    None
}

/// Collects `videoId` strings of exactly [`VIDEO_ID_LEN`] characters into
/// `ids`, skipping ones already present, and stops once `ids` holds `max`.
pub fn collect_video_ids(root: &Value, ids: &mut Vec<String>, max: usize) {
    let mut seen: HashSet<String> = ids.iter().cloned().collect();
    if ids.len() >= max {
        return;
    }
    walk_objects(root, |map| {
        if let Some(Value::String(id)) = map.get("videoId")
            && id.chars().count() == VIDEO_ID_LEN
            && seen.insert(id.clone())
        {
            ids.push(id.clone());
            if ids.len() >= max {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
}

/// Returns the first continuation token in depth-first, left-to-right order.
///
/// Matches either a `continuationCommand: { token }` field or an object that
/// carries a `token` string next to a `continuationEndpoint` field.
pub fn find_continuation(root: &Value) -> Option<String> {
    walk_objects(root, |map| match continuation_token(map) {
        Some(token) => ControlFlow::Break(token.to_owned()),
        None => ControlFlow::Continue(()),
    })
}

fn continuation_token(map: &Map<String, Value>) -> Option<&str> {
    let command_token = map
        .get("continuationCommand")
        .and_then(|command| command.get("token"))
        .and_then(Value::as_str);
    if command_token.is_some() {
        return command_token;
    }
    if map.contains_key("continuationEndpoint") {
        return map.get("token").and_then(Value::as_str);
    }
    None
}
