use std::future::Future;

use crate::backend::repo::message::Message;

pub mod openai;


pub const MAX_TITLE_CHARS: usize = 30;

/// Summarises a conversation into a short chat title.
pub trait TitleGenerator: Send + Sync + 'static {
    fn generate_title(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Cleans up model output so it can be stored as a chat title.
pub fn normalize_title(raw: &str) -> anyhow::Result<String> {
    let mut title = raw.lines().find(|line| !line.trim().is_empty()).unwrap_or("").trim();
    for quote in ['"', '\'', '`'] {
        title = title.trim_matches(quote).trim();
    }
    let title = title.trim_end_matches('.').trim_end();

    let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
    let title = title.trim_end().to_string();
    if title.is_empty() {
        anyhow::bail!("title generator returned an empty title");
    }
    Ok(title)
}
