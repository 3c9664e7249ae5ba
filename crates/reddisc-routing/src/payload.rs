//! Notification payload composition

use serde::Serialize;
use std::borrow::Cow;

/// Longest message the sink accepts (Discord's limit)
pub const MAX_NOTIFICATION_CHARS: usize = 2000;

/// Shown instead of a quoted parent when the comment replies to the post itself
pub const REPLY_TO_ORIGINAL_POST: &str = "Reply to the original post";

/// Context block describing what the comment replies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParentBlock {
    /// Parent is another comment; quoted with its author
    Comment { author: String, body: String },
    /// Parent is the submission
    OriginalPost,
    /// Parent could not be resolved; the block is omitted
    Unavailable,
}

/// Notification composed once per comment and shared by every matching tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub channel: String,
    pub author: String,
    pub submission_title: Option<String>,
    pub body: String,
    pub parent: ParentBlock,
    pub permalink: String,
}

impl NotificationPayload {
    /// Render the Markdown message handed to the sink.
    ///
    /// The result fits in `MAX_NOTIFICATION_CHARS` characters whenever the
    /// header, title and permalink alone do: the quoted body and parent are
    /// clipped, the longer one first, and the permalink is always kept.
    pub fn render(&self) -> String {
        let mut body_limit = self.body.chars().count();
        let mut parent_limit = match &self.parent {
            ParentBlock::Comment { body, .. } => body.chars().count(),
            _ => 0,
        };

        loop {
            let out = self.render_clipped(body_limit, parent_limit);
            let len = out.chars().count();
            if len <= MAX_NOTIFICATION_CHARS || (body_limit == 0 && parent_limit == 0) {
                return out;
            }

            // One extra for the ellipsis clipping adds. Quoting makes short
            // lines cost more than their length, so never cut more than half
            // in one round.
            let excess = len - MAX_NOTIFICATION_CHARS + 1;
            let shrink = |limit: usize| limit.saturating_sub(excess).max(limit / 2);
            if body_limit >= parent_limit {
                body_limit = shrink(body_limit);
            } else {
                parent_limit = shrink(parent_limit);
            }
        }
    }

    fn render_clipped(&self, body_limit: usize, parent_limit: usize) -> String {
        let mut out = format!("**New comment by u/{} in r/{}**\n", self.author, self.channel);

        if let Some(title) = &self.submission_title {
            out.push_str(&format!("Post: *{}*\n", title));
        }

        out.push_str(&quote_block(&clip(&self.body, body_limit)));
        out.push('\n');

        match &self.parent {
            ParentBlock::Comment { author, body } => {
                out.push_str(&format!("Replying to u/{}:\n", author));
                out.push_str(&quote_block(&clip(body, parent_limit)));
                out.push('\n');
            }
            ParentBlock::OriginalPost => {
                out.push_str(&format!("*{}*\n", REPLY_TO_ORIGINAL_POST));
            }
            ParentBlock::Unavailable => {}
        }

        out.push_str(&self.permalink);
        out
    }
}

/// Cut `text` to `limit` characters, marking the cut with an ellipsis
fn clip(text: &str, limit: usize) -> Cow<'_, str> {
    match text.char_indices().nth(limit) {
        None => Cow::Borrowed(text),
        Some((end, _)) => Cow::Owned(format!("{}…", text[..end].trim_end())),
    }
}

/// Prefix every line with `> ` to form a Markdown block quote
pub fn quote_block(text: &str) -> String {
    if text.is_empty() {
        return ">".to_string();
    }
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
