//! HLS master/media playlist parsing.

mod variant;

pub use variant::{select as select_variant, Variant};

use m3u8_rs::Playlist;
use url::Url;

use crate::error::{EngineError, Result};

/// Parse `text` as an HLS master playlist and resolve variant URIs against `base_url`.
/// Returns an empty list if `text` parses as a media playlist instead.
pub fn parse_master(text: &str, base_url: &Url) -> Result<Vec<Variant>> {
    let (_, playlist) = m3u8_rs::parse_playlist(text.as_bytes())
        .map_err(|e| EngineError::PlaylistParse(e.to_string()))?;

    let master = match playlist {
        Playlist::MasterPlaylist(master) => master,
        Playlist::MediaPlaylist(_) => return Ok(Vec::new()),
    };

    master
        .variants
        .into_iter()
        .map(|v| {
            let absolute_url = resolve(&v.uri, base_url)?;
            let height = v.resolution.map(|(_, h)| h as i64).unwrap_or(-1);
            let frame_rate = v.frame_rate.unwrap_or(0.0);
            let bandwidth = v.bandwidth as i64;
            Ok(Variant {
                absolute_url,
                height,
                frame_rate,
                bandwidth,
            })
        })
        .collect()
}

/// Parse `text` as an HLS media playlist, returning the media sequence number (if
/// present) and the ordered list of segment URIs.
pub fn parse_media(text: &str) -> Result<(Option<u64>, Vec<String>)> {
    let (_, playlist) = m3u8_rs::parse_playlist(text.as_bytes())
        .map_err(|e| EngineError::PlaylistParse(e.to_string()))?;

    let media = match playlist {
        Playlist::MediaPlaylist(media) => media,
        Playlist::MasterPlaylist(_) => {
            return Err(EngineError::PlaylistParse(
                "expected media playlist, got master playlist".to_string(),
            ));
        }
    };

    let sequence = Some(media.media_sequence);
    let uris = media.segments.into_iter().map(|s| s.uri).collect();
    Ok((sequence, uris))
}

fn resolve(uri: &str, base_url: &Url) -> Result<String> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(uri.to_string())
    } else {
        base_url
            .join(uri)
            .map(|u| u.to_string())
            .map_err(|_| EngineError::InvalidUrl(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_master_playlist_variants() {
        let content = r#"
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720,FRAME-RATE=29.97
video_720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1920x1080,FRAME-RATE=29.97
video_1080p.m3u8
        "#;
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let variants = parse_master(content.trim(), &base).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].height, 720);
        assert_eq!(variants[0].bandwidth, 1280000);
        assert_eq!(
            variants[0].absolute_url,
            "https://example.com/live/video_720p.m3u8"
        );
        assert_eq!(variants[1].height, 1080);
    }

    #[test]
    fn master_with_absolute_variant_uris_keeps_them_as_is() {
        let content = r#"
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720
https://cdn.example/720p.m3u8
        "#;
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let variants = parse_master(content.trim(), &base).unwrap();
        assert_eq!(variants[0].absolute_url, "https://cdn.example/720p.m3u8");
    }

    #[test]
    fn missing_attributes_use_spec_defaults() {
        let content = r#"
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500000
stream.m3u8
        "#;
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let variants = parse_master(content.trim(), &base).unwrap();
        assert_eq!(variants[0].height, -1);
        assert_eq!(variants[0].frame_rate, 0.0);
    }

    #[test]
    fn parse_master_on_media_playlist_returns_empty() {
        let content = r#"
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:8
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:7.5,
segment_0.ts
        "#;
        let base = Url::parse("https://example.com/live/index.m3u8").unwrap();
        let variants = parse_master(content.trim(), &base).unwrap();
        assert!(variants.is_empty());
    }

    #[test]
    fn parses_media_playlist_sequence_and_segments() {
        let content = r#"
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:8
#EXT-X-MEDIA-SEQUENCE:2680

#EXTINF:7.975,
segment_2680.ts
#EXTINF:7.941,
segment_2681.ts
        "#;
        let (sequence, uris) = parse_media(content.trim()).unwrap();
        assert_eq!(sequence, Some(2680));
        assert_eq!(uris, vec!["segment_2680.ts", "segment_2681.ts"]);
    }
}
