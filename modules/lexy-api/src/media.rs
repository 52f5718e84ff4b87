//! Embeddable media detection for search results.

use lexy_common::{Media, MediaType, Post};
use url::Url;

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif"];

/// Media attached to a result link, if the link points at a known video host or an image.
pub fn detect(link: &str) -> Option<Media> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let segments: Vec<&str> = url.path_segments().map(|s| s.filter(|p| !p.is_empty()).collect()).unwrap_or_default();

    let video = |platform: &str, embed_url: String| Media {
        media_type: MediaType::Video,
        platform: Some(platform.to_string()),
        embed_url: Some(embed_url),
        url: Some(link.to_string()),
    };

    match host {
        "youtube.com" => {
            let id = match segments.as_slice() {
                ["watch"] => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                ["shorts", id] | ["embed", id] | ["live", id] => Some(id.to_string()),
                _ => None,
            }?;
            Some(video("youtube", format!("https://www.youtube.com/embed/{id}")))
        }
        "youtu.be" => {
            let id = segments.first()?;
            Some(video("youtube", format!("https://www.youtube.com/embed/{id}")))
        }
        "tiktok.com" => match segments.as_slice() {
            [_, "video", id] => Some(video("tiktok", format!("https://www.tiktok.com/embed/v2/{id}"))),
            _ => None,
        },
        "vimeo.com" => {
            let id = segments.iter().rev().find(|s| s.chars().all(|c| c.is_ascii_digit()))?;
            Some(video("vimeo", format!("https://player.vimeo.com/video/{id}")))
        }
        _ => {
            let path = url.path().to_lowercase();
            IMAGE_EXTENSIONS
                .iter()
                .any(|ext| path.ends_with(ext))
                .then(|| Media {
                    media_type: MediaType::Image,
                    platform: None,
                    embed_url: None,
                    url: Some(link.to_string()),
                })
        }
    }
}

pub fn enrich(mut post: Post) -> Post {
    post.media = detect(&post.link);
    post
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embed(link: &str) -> Option<String> {
        detect(link).and_then(|m| m.embed_url)
    }

    #[test]
    fn youtube_links_in_all_forms() {
        let expected = Some("https://www.youtube.com/embed/abc123".to_string());
        assert_eq!(embed("https://www.youtube.com/watch?v=abc123&t=10"), expected);
        assert_eq!(embed("https://youtu.be/abc123"), expected);
        assert_eq!(embed("https://m.youtube.com/shorts/abc123"), expected);
        assert_eq!(embed("https://www.youtube.com/@channel"), None);
    }

    #[test]
    fn tiktok_and_vimeo() {
        assert_eq!(
            embed("https://www.tiktok.com/@someone/video/7212345"),
            Some("https://www.tiktok.com/embed/v2/7212345".to_string())
        );
        assert_eq!(
            embed("https://vimeo.com/channels/staffpicks/76979871"),
            Some("https://player.vimeo.com/video/76979871".to_string())
        );
        assert_eq!(detect("https://vimeo.com/about"), None);
    }

    #[test]
    fn direct_image_links() {
        let media = detect("https://i.redd.it/photo.JPG").unwrap();
        assert_eq!(media.media_type, MediaType::Image);
        assert_eq!(media.url.as_deref(), Some("https://i.redd.it/photo.JPG"));
        assert!(media.embed_url.is_none());
    }

    #[test]
    fn ordinary_pages_have_no_media() {
        assert_eq!(detect("https://www.reddit.com/r/fitness/comments/abc/"), None);
        assert_eq!(detect("not a url"), None);
    }
}
