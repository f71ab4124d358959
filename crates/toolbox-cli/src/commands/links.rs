use serde_json::Value;
use toolbox_core::models::{LinkCollection, LinkItem};
use toolbox_core::util::normalize_text_option;

use crate::cli::LinksCommands;
use crate::commands::common::{print_json, CliSession};
use crate::error::CliError;

pub async fn run_links(command: LinksCommands, session: &CliSession) -> Result<(), CliError> {
    match command {
        LinksCommands::List { json } => {
            let links = session.snapshot().links;
            if json {
                return print_json(&links);
            }
            if links.is_empty() {
                println!("No pinned links.");
            }
            for item in links.items() {
                println!("{}", describe(item));
            }
        }
        LinksCommands::Add { url, title } => {
            let item = LinkItem::url(url.trim(), normalize_text_option(title));
            if session.add_link(item.clone()).await {
                println!("Pinned {}", describe(&item));
            } else {
                println!("Already pinned: {}", describe(&item));
            }
        }
        LinksCommands::Remove { url } => {
            let matches = links_with_url(&session.snapshot().links, &url);
            if matches.is_empty() {
                return Err(CliError::LinkNotFound(url));
            }
            for item in &matches {
                session.remove_link(item).await;
            }
            println!("Unpinned {} link(s)", matches.len());
        }
        LinksCommands::Replace {
            old_url,
            new_url,
            title,
        } => {
            let links = session.snapshot().links;
            let Some(old) = links_with_url(&links, &old_url).into_iter().next() else {
                return Err(CliError::LinkNotFound(old_url));
            };
            let title = normalize_text_option(title).or_else(|| title_of(&old));
            let new = LinkItem::url(new_url.trim(), title);
            session.replace_link(&old, new.clone()).await;
            println!("Replaced {} with {}", describe(&old), describe(&new));
        }
    }
    Ok(())
}

fn url_of(item: &LinkItem) -> Option<&str> {
    item.as_value().get("url").and_then(Value::as_str)
}

fn title_of(item: &LinkItem) -> Option<String> {
    item.as_value()
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn links_with_url(links: &LinkCollection, url: &str) -> Vec<LinkItem> {
    let url = url.trim();
    links
        .items()
        .iter()
        .filter(|item| url_of(item) == Some(url))
        .cloned()
        .collect()
}

fn describe(item: &LinkItem) -> String {
    match (url_of(item), title_of(item)) {
        (Some(url), Some(title)) => format!("{title} <{url}>"),
        (Some(url), None) => url.to_string(),
        _ => item.as_value().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn links_are_matched_by_url_field() {
        let links: LinkCollection = [
            LinkItem::url("https://a.example", None),
            LinkItem::url("https://a.example", Some("A".to_string())),
            LinkItem::url("https://b.example", None),
            LinkItem::new(json!("opaque")),
        ]
        .into_iter()
        .collect();

        assert_eq!(links_with_url(&links, " https://a.example ").len(), 2);
        assert!(links_with_url(&links, "https://c.example").is_empty());
    }

    #[test]
    fn describe_handles_every_shape() {
        assert_eq!(
            describe(&LinkItem::url("https://a.example", Some("A".to_string()))),
            "A <https://a.example>"
        );
        assert_eq!(describe(&LinkItem::url("https://a.example", None)), "https://a.example");
        assert_eq!(describe(&LinkItem::new(json!({"k": 1}))), r#"{"k":1}"#);
    }
}
