use rss::Channel;

use crate::error::{AppError, Result};

/// A fetched document, held only for the duration of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub description: String,
    pub items: Vec<RawItem>,
}

/// One `<item>` exactly as the document carried it, apart from entity decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Parse an RSS document. A malformed document yields no items at all.
pub fn parse(bytes: &[u8]) -> Result<RawDocument> {
    let channel = Channel::read_from(bytes).map_err(|e| AppError::Parse(e.to_string()))?;

    let items = channel
        .items()
        .iter()
        .map(|item| RawItem {
            title: unescape(item.title().unwrap_or_default()),
            link: item.link().unwrap_or_default().trim().to_string(),
            description: unescape(item.description().unwrap_or_default()),
            pub_date: item.pub_date().unwrap_or_default().trim().to_string(),
        })
        .collect();

    Ok(RawDocument {
        title: unescape(channel.title()),
        description: unescape(channel.description()),
        items,
    })
}

/// Decode HTML character entities left after XML unescaping (`&amp;#39;`, `&eacute;`).
fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
