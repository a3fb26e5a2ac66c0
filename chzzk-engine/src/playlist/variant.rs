//! Variant selection over a parsed master playlist.

use crate::config::Quality;

/// One rendition listed in an HLS master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub absolute_url: String,
    pub height: i64,
    pub frame_rate: f64,
    pub bandwidth: i64,
}

impl Variant {
    fn sort_key(&self) -> (i64, FrameRateKey, i64) {
        (self.height, FrameRateKey(self.frame_rate), self.bandwidth)
    }
}

// m3u8-rs frame rates are f64 and not NaN in practice (parsed from a decimal literal);
// wrap in a type that is comparable for max_by_key without pulling in a crate for it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct FrameRateKey(f64);

impl Eq for FrameRateKey {}
impl Ord for FrameRateKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Select a rendition out of `variants` according to `quality`. Returns `None` only
/// when `variants` is empty.
pub fn select<'a>(variants: &'a [Variant], quality: Quality) -> Option<&'a Variant> {
    match quality {
        Quality::Best => variants.iter().max_by_key(|v| v.sort_key()),
        Quality::Prefer1080 => {
            let smallest_above = variants
                .iter()
                .filter(|v| v.height >= 1080)
                .min_by_key(|v| v.sort_key());
            smallest_above.or_else(|| variants.iter().max_by_key(|v| v.sort_key()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(height: i64, fps: f64, bandwidth: i64) -> Variant {
        Variant {
            absolute_url: format!("https://example/{height}.m3u8"),
            height,
            frame_rate: fps,
            bandwidth,
        }
    }

    #[test]
    fn best_picks_max_height_then_fps_then_bandwidth() {
        let variants = vec![variant(720, 30.0, 1_000_000), variant(1080, 30.0, 2_000_000)];
        let chosen = select(&variants, Quality::Best).unwrap();
        assert_eq!(chosen.height, 1080);
    }

    #[test]
    fn prefer_1080_picks_smallest_qualifying_variant() {
        let variants = vec![
            variant(1080, 30.0, 2_000_000),
            variant(1440, 30.0, 4_000_000),
            variant(720, 60.0, 1_500_000),
        ];
        let chosen = select(&variants, Quality::Prefer1080).unwrap();
        assert_eq!(chosen.height, 1080);
    }

    #[test]
    fn prefer_1080_falls_back_to_best_when_none_qualify() {
        let variants = vec![variant(480, 30.0, 500_000), variant(720, 30.0, 1_000_000)];
        let chosen = select(&variants, Quality::Prefer1080).unwrap();
        assert_eq!(chosen.height, 720);
    }

    #[test]
    fn select_on_empty_list_is_none() {
        assert!(select(&[], Quality::Best).is_none());
    }
}
