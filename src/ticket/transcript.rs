//! Transcript rendering and staging.
//!
//! A transcript is a self-contained HTML page of a channel's history. It is
//! staged as a temporary file for upload; [`StagedTranscript`] removes the
//! file when dropped, so the artifact never outlives its delivery attempt.

use crate::platform::{Attachment, HistoryEntry};
use std::fmt::Write as _;
use std::path::PathBuf;
use tempfile::TempPath;
use tracing::debug;

const STYLE: &str = "body { font-family: sans-serif; background-color: #36393f; color: #dcddde; }\
.message { display: flex; align-items: flex-start; margin-bottom: 15px; }\
.avatar { width: 40px; height: 40px; border-radius: 50%; margin-right: 15px; }\
.message-content { display: flex; flex-direction: column; }\
.author { font-weight: bold; margin-bottom: 3px; }\
.timestamp { color: #72767d; font-size: 0.75em; }\
.content { white-space: pre-wrap; }\
.embed { border-left: 4px solid #4f545c; padding: 4px 8px; margin-top: 4px; }\
.attachment a { color: #00aff4; }";

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a channel's history (oldest first) as an HTML document.
pub fn render(channel_name: &str, history: &[HistoryEntry]) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Transcript</title><style>{STYLE}</style></head><body><h1>Transcript for #{}</h1>",
        escape(channel_name)
    );

    for entry in history {
        html.push_str("<div class=\"message\">");
        if let Some(avatar) = &entry.author_avatar {
            let _ = write!(html, "<img src=\"{}\" class=\"avatar\">", escape(avatar));
        }
        let _ = write!(
            html,
            "<div class=\"message-content\"><div><span class=\"author\">{}</span> <span class=\"timestamp\">{}</span></div><div class=\"content\">{}</div>",
            escape(&entry.author_name),
            entry.sent_at.format("%Y-%m-%d %H:%M:%S UTC"),
            escape(&entry.content)
        );
        for (title, description) in &entry.embeds {
            html.push_str("<div class=\"embed\">");
            if let Some(title) = title {
                let _ = write!(html, "<strong>{}</strong><br>", escape(title));
            }
            if let Some(description) = description {
                html.push_str(&escape(description));
            }
            html.push_str("</div>");
        }
        for url in &entry.attachments {
            let url = escape(url);
            let _ = write!(
                html,
                "<div class=\"attachment\"><a href=\"{url}\">{url}</a></div>"
            );
        }
        html.push_str("</div></div>");
    }

    html.push_str("</body></html>");
    html
}

/// Writes transcripts into a staging directory.
#[derive(Debug, Clone)]
pub struct TranscriptStager {
    dir: PathBuf,
}

impl TranscriptStager {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write `html` to a uniquely named file in the staging directory.
    pub async fn stage(&self, channel_name: &str, html: &str) -> std::io::Result<StagedTranscript> {
        let filename = format!("transcript-{channel_name}.html");
        let file = tempfile::Builder::new()
            .prefix("transcript-")
            .suffix(".html")
            .tempfile_in(&self.dir)?;
        let file = file.into_temp_path();
        tokio::fs::write(&file, html).await?;
        debug!(path = %file.display(), "Transcript staged");
        Ok(StagedTranscript {
            attachment: Attachment {
                filename,
                path: file.to_path_buf(),
            },
            _file: file,
        })
    }
}

/// A transcript file awaiting upload. Removed on drop.
#[derive(Debug)]
pub struct StagedTranscript {
    attachment: Attachment,
    _file: TempPath,
}

impl StagedTranscript {
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(author: &str, content: &str) -> HistoryEntry {
        HistoryEntry {
            author_name: author.to_string(),
            author_avatar: Some("https://cdn.example/a.png".to_string()),
            sent_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            content: content.to_string(),
            attachments: vec!["https://cdn.example/log.txt".to_string()],
            embeds: vec![(Some("Welcome".to_string()), Some("Hi".to_string()))],
        }
    }

    #[test]
    fn test_render_escapes_and_orders_history() {
        let html = render(
            "closed-0001",
            &[entry("alice", "<script>x</script>"), entry("bob", "second")],
        );
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Transcript for #closed-0001"));
        assert!(html.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("2024-03-01 12:30:00 UTC"));
        assert!(html.contains("https://cdn.example/log.txt"));
        assert!(html.find("alice").unwrap() < html.find("bob").unwrap());
    }

    #[tokio::test]
    async fn test_staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let stager = TranscriptStager::new(dir.path().to_path_buf());
        let staged = stager.stage("ticket-0002", "<html></html>").await.unwrap();

        let path = staged.attachment().path.clone();
        assert_eq!(staged.attachment().filename, "transcript-ticket-0002.html");
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_stages_of_one_channel_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let stager = TranscriptStager::new(dir.path().to_path_buf());
        let (a, b) = tokio::join!(
            stager.stage("ticket-0003", "<html>a</html>"),
            stager.stage("ticket-0003", "<html>b</html>"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.attachment().filename, b.attachment().filename);
        assert_ne!(a.attachment().path, b.attachment().path);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        drop(a);
        assert!(b.attachment().path.exists());
        drop(b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
