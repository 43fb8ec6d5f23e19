//! Gallery shortcodes and asset references inside record bodies

use super::context::{CopiedAsset, GalleryReference};
use crate::models::AssetId;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use tracing::warn;

static GALLERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[gallery\b[^\]]*\]").expect("gallery pattern is valid")
});

static ATTACHMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"id="attachment_(\d+)""#).expect("attachment pattern is valid")
});

static IDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ids="([0-9,\s]*)""#).expect("ids pattern is valid")
});

/// Every gallery shortcode in a body, in order of appearance
pub fn find_galleries(body: &str) -> Vec<GalleryReference> {
    GALLERY
        .find_iter(body)
        .map(|m| {
            let shortcode = m.as_str().to_string();
            let ids = IDS
                .captures(&shortcode)
                .map(|c| parse_ids(&c[1]))
                .unwrap_or_default();
            GalleryReference { shortcode, ids }
        })
        .collect()
}

fn parse_ids(list: &str) -> Vec<AssetId> {
    list.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

/// Point locators and caption anchors at the copied assets.
/// Each reference is rewritten once, so a new id or url that equals another
/// asset's old one is left alone.
pub fn rewrite_asset_references(body: &str, copied: &[CopiedAsset]) -> String {
    let ids: HashMap<AssetId, AssetId> = copied.iter().map(|c| (c.old_id, c.new_id)).collect();
    let body = ATTACHMENT.replace_all(body, |caps: &Captures| {
        match caps[1].parse::<AssetId>().ok().and_then(|id| ids.get(&id)) {
            Some(new_id) => format!("id=\"attachment_{}\"", new_id),
            None => caps[0].to_string(),
        }
    });
    rewrite_urls(&body, copied)
}

fn rewrite_urls(body: &str, copied: &[CopiedAsset]) -> String {
    let mut urls: Vec<&CopiedAsset> = copied.iter().filter(|c| !c.old_url.is_empty()).collect();
    if urls.is_empty() {
        return body.to_string();
    }
    // Alternation is leftmost-first: longer urls must win over their prefixes
    urls.sort_by(|a, b| b.old_url.len().cmp(&a.old_url.len()));

    let pattern = urls
        .iter()
        .map(|c| regex::escape(&c.old_url))
        .collect::<Vec<_>>()
        .join("|");
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("Asset urls left unchanged: {}", e);
            return body.to_string();
        }
    };

    re.replace_all(body, |caps: &Captures| {
        urls.iter()
            .find(|c| c.old_url == caps[0])
            .map(|c| c.new_url.clone())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Replace each gallery's id list with the ids of the copies.
/// Ids that were not replicated are dropped.
pub fn rewrite_galleries(body: &str, galleries: &[GalleryReference], copied: &[CopiedAsset]) -> String {
    GALLERY
        .replace_all(body, |caps: &Captures| {
            let shortcode = &caps[0];
            let Some(gallery) = galleries.iter().find(|g| g.shortcode == shortcode) else {
                return shortcode.to_string();
            };

            let new_ids: Vec<String> = gallery
                .ids
                .iter()
                .filter_map(|old| copied.iter().find(|c| c.old_id == *old))
                .map(|c| c.new_id.to_string())
                .collect();

            let replacement = format!("ids=\"{}\"", new_ids.join(","));
            IDS.replace(shortcode, regex::NoExpand(&replacement)).into_owned()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copied(old_id: AssetId, new_id: AssetId) -> CopiedAsset {
        CopiedAsset {
            old_id,
            old_url: format!("http://one.test/uploads/{}.jpg", old_id),
            new_id,
            new_url: format!("http://two.test/uploads/{}.jpg", old_id),
        }
    }

    #[test]
    fn test_find_galleries() {
        let body = r#"Intro [gallery columns="2" ids="5,6, 7"] and [gallery] end [caption]x[/caption]"#;
        let galleries = find_galleries(body);

        assert_eq!(galleries.len(), 2);
        assert_eq!(galleries[0].ids, vec![5, 6, 7]);
        assert_eq!(galleries[0].shortcode, r#"[gallery columns="2" ids="5,6, 7"]"#);
        assert!(galleries[1].ids.is_empty());
    }

    #[test]
    fn test_rewrite_galleries_drops_unreplicated() {
        let body = r#"[gallery ids="5,6,7"]"#;
        let galleries = find_galleries(body);

        let rewritten = rewrite_galleries(body, &galleries, &[copied(5, 50), copied(7, 70)]);
        assert_eq!(rewritten, r#"[gallery ids="50,70"]"#);
    }

    #[test]
    fn test_rewrite_asset_references() {
        let body = r#"<div id="attachment_5"><img src="http://one.test/uploads/5.jpg"></div>"#;
        let rewritten = rewrite_asset_references(body, &[copied(5, 50)]);

        assert_eq!(
            rewritten,
            r#"<div id="attachment_50"><img src="http://two.test/uploads/5.jpg"></div>"#
        );
    }

    #[test]
    fn test_new_ids_colliding_with_old_ids() {
        let body = r#"<div id="attachment_60"></div><div id="attachment_61"></div>"#;
        let rewritten = rewrite_asset_references(body, &[copied(60, 61), copied(61, 62)]);

        assert_eq!(
            rewritten,
            r#"<div id="attachment_61"></div><div id="attachment_62"></div>"#
        );
    }

    #[test]
    fn test_urls_rewritten_once() {
        let first = CopiedAsset {
            old_id: 1,
            old_url: "http://one.test/a.jpg".to_string(),
            new_id: 10,
            new_url: "http://one.test/b.jpg".to_string(),
        };
        let second = CopiedAsset {
            old_id: 2,
            old_url: "http://one.test/b.jpg".to_string(),
            new_id: 20,
            new_url: "http://one.test/c.jpg".to_string(),
        };
        let longer = CopiedAsset {
            old_id: 3,
            old_url: "http://one.test/a.jpg.webp".to_string(),
            new_id: 30,
            new_url: "http://two.test/d.webp".to_string(),
        };

        let body = r#"<img src="http://one.test/a.jpg"><img src="http://one.test/b.jpg"><img src="http://one.test/a.jpg.webp">"#;
        let rewritten = rewrite_asset_references(body, &[first, second, longer]);

        assert_eq!(
            rewritten,
            r#"<img src="http://one.test/b.jpg"><img src="http://one.test/c.jpg"><img src="http://two.test/d.webp">"#
        );
    }

    #[test]
    fn test_gallery_ids_colliding_with_other_gallery() {
        let body = r#"[gallery ids="5"][gallery ids="50"]"#;
        let galleries = find_galleries(body);

        let rewritten = rewrite_galleries(body, &galleries, &[copied(5, 50), copied(50, 500)]);
        assert_eq!(rewritten, r#"[gallery ids="50"][gallery ids="500"]"#);
    }
}
