#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use weft_core::model::{Message, Thread};

use super::StoreError;

const TITLE_PREVIEW_CHARS: usize = 20;

/// The fully planned outcome of one branch operation. Computed from a
/// snapshot of the source thread's messages before any write happens, so a
/// failed apply has nothing to clean up beyond its own transaction.
#[derive(Debug)]
pub(crate) struct BranchPlan {
    pub(crate) new_thread: Thread,
    /// Re-emitted copies in parent-before-child order (the ancestor chain
    /// root-first, then the moved subtree in breadth-first order).
    pub(crate) copies: Vec<Message>,
    /// Old ids to remove from the origin thread: the source message and its
    /// descendants. Ancestors stay behind.
    pub(crate) removed: Vec<String>,
}

/// Plans a branch from `source_id` over `thread_messages`, the complete
/// message set of the source message's thread.
///
/// Ancestors of the source are copied, the source and its descendants are
/// moved; every touched message gets a fresh id from `fresh_id`, parent
/// links are rewritten through the old-to-new id map, and every copy's
/// `root_id` is the new id of the chain's terminal ancestor (the source
/// itself when it has no parent). The copied structure depends only on the
/// id map, never on traversal order.
pub(crate) fn plan_branch(
    thread_messages: &[Message],
    source_id: &str,
    fresh_id: &dyn Fn() -> String,
    now: i64,
) -> Result<BranchPlan, StoreError> {
    let by_id: HashMap<&str, &Message> = thread_messages
        .iter()
        .map(|message| (message.id.as_str(), message))
        .collect();
    let source = *by_id.get(source_id).ok_or(StoreError::MessageNotFound)?;

    // Ancestor chain, root first. A dangling parent link ends the walk; a
    // chain longer than the thread itself can only be a cycle.
    let mut ancestors: Vec<&Message> = Vec::new();
    let mut cursor = source;
    while let Some(parent_id) = cursor.parent_id.as_deref() {
        let Some(parent) = by_id.get(parent_id).copied() else {
            break;
        };
        ancestors.push(parent);
        cursor = parent;
        if ancestors.len() > thread_messages.len() {
            return Err(StoreError::ParentCycle);
        }
    }
    ancestors.reverse();

    // The moved set: the source plus its descendants, breadth-first.
    let mut children: HashMap<&str, Vec<&Message>> = HashMap::new();
    for message in thread_messages {
        if let Some(parent_id) = message.parent_id.as_deref() {
            children.entry(parent_id).or_default().push(message);
        }
    }
    let mut moved: Vec<&Message> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&Message> = VecDeque::new();
    seen.insert(source.id.as_str());
    queue.push_back(source);
    while let Some(current) = queue.pop_front() {
        moved.push(current);
        if let Some(kids) = children.get(current.id.as_str()) {
            for kid in kids {
                if seen.insert(kid.id.as_str()) {
                    queue.push_back(kid);
                }
            }
        }
    }

    let mut id_map: HashMap<&str, String> = HashMap::new();
    for message in ancestors.iter().chain(moved.iter()) {
        id_map.insert(message.id.as_str(), fresh_id());
    }

    let root_old = ancestors
        .first()
        .map(|message| message.id.as_str())
        .unwrap_or(source_id);
    let new_root = id_map[root_old].clone();

    let new_thread = Thread {
        id: fresh_id(),
        title: branch_title(&source.content),
        created_at: now,
    };

    let copies = ancestors
        .iter()
        .chain(moved.iter())
        .map(|message| Message {
            id: id_map[message.id.as_str()].clone(),
            thread_id: new_thread.id.clone(),
            parent_id: message
                .parent_id
                .as_deref()
                .and_then(|parent_id| id_map.get(parent_id).cloned()),
            root_id: Some(new_root.clone()),
            role: message.role.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        })
        .collect();

    let removed = moved.iter().map(|message| message.id.clone()).collect();

    Ok(BranchPlan {
        new_thread,
        copies,
        removed,
    })
}

fn branch_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return "Branched".to_string();
    }
    let preview: String = trimmed.chars().take(TITLE_PREVIEW_CHARS).collect();
    format!("Branched: {preview}")
}
