//! Plain text views of a [`SyncState`]. Nothing here touches the network.

use crate::sync::{
    state::{Severity, SyncState},
    thread::ThreadState,
};
use feedsync_common::model::post::Post;
use time::{OffsetDateTime, macros::format_description};

fn format_date(date: OffsetDateTime) -> String {
    date.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| date.to_string())
}

fn render_post(post: &Post, expanded: bool, lines: &mut Vec<String>) {
    lines.push(format!(
        "[{}] {} ({})",
        post.id,
        post.owner.display_name(),
        format_date(post.publish_date)
    ));
    lines.push(format!("    {}", post.text));
    if !post.tags.is_empty() {
        let tags: Vec<_> = post.tags.iter().map(|tag| format!("#{tag}")).collect();
        lines.push(format!("    {}", tags.join(" ")));
    }
    if let Some(link) = &post.link {
        lines.push(format!("    {link}"));
    }

    let likes = if post.likes > 0 {
        format!("{} likes", post.likes)
    } else {
        "Like".to_owned()
    };
    let comments = if expanded { "comments open" } else { "See comments" };
    lines.push(format!("    {likes} | {comments}"));
}

#[must_use]
pub fn render_feed(state: &SyncState) -> String {
    if state.posts.is_empty() {
        return "No posts.".to_owned();
    }

    let expanded = state.active_thread.post_id();
    let mut lines = Vec::new();
    for post in &state.posts {
        render_post(post, expanded == Some(&post.id), &mut lines);
    }

    lines.join("\n")
}

#[must_use]
pub fn render_thread(state: &SyncState) -> String {
    let mut lines = Vec::new();

    match &state.active_thread {
        ThreadState::Collapsed => return "No thread open.".to_owned(),
        ThreadState::Loading { post_id, .. } => {
            return format!("Loading comments for {post_id}...");
        }
        ThreadState::Loaded { post_id, comments }
        | ThreadState::Composing {
            post_id, comments, ..
        } => {
            lines.push(format!("Comments on {post_id} ({})", comments.len()));
            if comments.is_empty() {
                lines.push("    No comments yet.".to_owned());
            }
            for comment in comments {
                lines.push(format!(
                    "    {}: {}",
                    comment.owner.display_name(),
                    comment.message
                ));
            }
        }
    }

    if let ThreadState::Composing {
        draft, submitting, ..
    } = &state.active_thread
    {
        match &state.session_self {
            Some(user) => lines.push(format!("Commenting as {}", user.display_name())),
            None => lines.push("Picking a user to comment as...".to_owned()),
        }
        let sending = if *submitting { " (sending)" } else { "" };
        lines.push(format!("> {draft}{sending}"));
    }

    lines.join("\n")
}

#[must_use]
pub fn render_status(state: &SyncState) -> Option<String> {
    state.transient_message.as_ref().map(|message| {
        let label = match message.severity {
            Severity::Info => "info",
            Severity::Error => "error",
        };
        format!("[{label}] {}", message.text)
    })
}
