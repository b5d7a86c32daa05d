//! Rotation builder: interleaves the category pools into one ordered cycle.

use crate::model::{Category, ContentItem};
use serde::{Deserialize, Serialize};

/// Music slots in one rotation cycle.
pub const MUSIC_SLOTS_PER_CYCLE: usize = 50;

/// Slot residue at which an ad is inserted (`slot % ad_frequency`).
pub const AD_SLOT_OFFSET: usize = 2;

/// Slot residue at which an announcement is inserted.
pub const ANNOUNCEMENT_SLOT_OFFSET: usize = 4;

/// A tiny silent WAV, playable everywhere. Used by built-in fallback content.
pub const FALLBACK_AUDIO_URL: &str =
    "data:audio/wav;base64,UklGRigAAABXQVZFZm10IBAAAAABAAEAQB8AAEAfAAABAAgAZGF0YQAAAAA=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Insert an ad on every slot where `slot % ad_frequency == 2`.
    pub ad_frequency: usize,
    /// Insert an announcement on every slot where `slot % announcement_frequency == 4`.
    pub announcement_frequency: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { ad_frequency: 3, announcement_frequency: 5 }
    }
}

/// Build one rotation cycle from the three category pools.
///
/// Each pool is consumed cyclically from its own cursor, starting at 0 on
/// every call. When all pools are empty the built-in fallback cycle is
/// returned so the player always has something to load.
///
/// A frequency of 0 is treated as 1.
pub fn build_rotation(
    music: &[ContentItem],
    ads: &[ContentItem],
    announcements: &[ContentItem],
    cfg: &RotationConfig,
) -> Vec<ContentItem> {
    let ad_freq = cfg.ad_frequency.max(1);
    let ann_freq = cfg.announcement_frequency.max(1);

    let mut out = Vec::with_capacity(
        MUSIC_SLOTS_PER_CYCLE + MUSIC_SLOTS_PER_CYCLE / ad_freq + MUSIC_SLOTS_PER_CYCLE / ann_freq,
    );
    let (mut music_cursor, mut ad_cursor, mut ann_cursor) = (0usize, 0usize, 0usize);

    for slot in 0..MUSIC_SLOTS_PER_CYCLE {
        if !music.is_empty() {
            out.push(music[music_cursor % music.len()].clone());
            music_cursor += 1;
        }

        if slot % ad_freq == AD_SLOT_OFFSET && !ads.is_empty() {
            out.push(ads[ad_cursor % ads.len()].clone());
            ad_cursor += 1;
        }

        if slot % ann_freq == ANNOUNCEMENT_SLOT_OFFSET && !announcements.is_empty() {
            out.push(announcements[ann_cursor % announcements.len()].clone());
            ann_cursor += 1;
        }
    }

    if out.is_empty() {
        return fallback_rotation();
    }
    out
}

/// Deterministic demo cycle used when the catalog has nothing to offer.
pub fn fallback_rotation() -> Vec<ContentItem> {
    vec![
        fallback_item("fallback-music-1", "Demo Track 1", "Demo Artist", Category::Music, 3),
        fallback_item("fallback-ad-1", "Station Promo", "Sponsor", Category::Ad, 2),
        fallback_item("fallback-music-2", "Demo Track 2", "Demo Artist", Category::Music, 3),
    ]
}

/// Built-in stand-in for a single category, used when the catalog has no
/// item of that category (e.g. no recorded hour announcement yet).
pub fn default_item(category: Category) -> ContentItem {
    match category {
        Category::Music => fallback_item("fallback-music", "Demo Track", "Demo Artist", category, 5),
        Category::Ad => fallback_item("fallback-ad", "Station Promo", "Sponsor", category, 3),
        Category::Announcement => {
            fallback_item("fallback-announcement", "Station Notice", "System", category, 2)
        }
        Category::TimeSignal => fallback_item("fallback-time-signal", "Time Check", "System", category, 3),
    }
}

fn fallback_item(id: &str, title: &str, artist: &str, category: Category, dur: u32) -> ContentItem {
    ContentItem {
        id: id.into(),
        title: Some(title.into()),
        artist: Some(artist.into()),
        url: FALLBACK_AUDIO_URL.into(),
        category,
        duration_seconds: dur,
        play_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, category: Category) -> ContentItem {
        ContentItem {
            id: id.into(),
            title: Some(id.to_uppercase()),
            artist: None,
            url: format!("https://cdn.example/{id}.mp3"),
            category,
            duration_seconds: 180,
            play_count: 0,
        }
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn ads_land_on_offset_slots() {
        let music = vec![item("m1", Category::Music), item("m2", Category::Music)];
        let ads = vec![item("a1", Category::Ad)];
        let cfg = RotationConfig { ad_frequency: 3, announcement_frequency: 1000 };

        let out = build_rotation(&music, &ads, &[], &cfg);

        // slots 2, 5, 8, ..., 47 -> 16 ads
        assert_eq!(out.len(), 50 + 16);
        assert_eq!(ids(&out[..8]), ["m1", "m2", "m1", "a1", "m2", "m1", "m2", "a1"]);

        // Walk the output back into slots and check every ad follows a slot with residue 2.
        let mut slot = 0usize;
        for it in &out {
            match it.category {
                Category::Music => slot += 1,
                Category::Ad => assert_eq!((slot - 1) % 3, 2),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn music_cycles_in_pool_order() {
        let music = vec![
            item("m1", Category::Music),
            item("m2", Category::Music),
            item("m3", Category::Music),
        ];
        let out = build_rotation(&music, &[], &[], &RotationConfig::default());
        assert_eq!(out.len(), MUSIC_SLOTS_PER_CYCLE);
        for (i, it) in out.iter().enumerate() {
            assert_eq!(it.id, music[i % 3].id);
        }
    }

    #[test]
    fn all_three_categories_interleave() {
        let music = vec![item("m1", Category::Music)];
        let ads = vec![item("a1", Category::Ad), item("a2", Category::Ad)];
        let anns = vec![item("n1", Category::Announcement)];
        let cfg = RotationConfig { ad_frequency: 3, announcement_frequency: 5 };

        let out = build_rotation(&music, &ads, &anns, &cfg);

        let n_music = out.iter().filter(|i| i.category == Category::Music).count();
        let n_ads = out.iter().filter(|i| i.category == Category::Ad).count();
        let n_anns = out.iter().filter(|i| i.category == Category::Announcement).count();
        assert_eq!(n_music, 50);
        assert_eq!(n_ads, 16);
        assert_eq!(n_anns, 10);

        // Slot 2 carries the first ad, slot 4 the first announcement, slot 5 the second ad.
        assert_eq!(ids(&out[..9]), ["m1", "m1", "m1", "a1", "m1", "m1", "n1", "m1", "a2"]);
    }

    #[test]
    fn frequency_one_never_matches_offsets() {
        let music = vec![item("m1", Category::Music)];
        let ads = vec![item("a1", Category::Ad)];
        let cfg = RotationConfig { ad_frequency: 1, announcement_frequency: 1 };
        let out = build_rotation(&music, &ads, &ads, &cfg);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn ads_only_catalog_still_rotates() {
        let ads = vec![item("a1", Category::Ad)];
        let out = build_rotation(&[], &ads, &[], &RotationConfig::default());
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|i| i.id == "a1"));
    }

    #[test]
    fn empty_pools_yield_fallback() {
        let out = build_rotation(&[], &[], &[], &RotationConfig::default());
        assert!(!out.is_empty());
        assert_eq!(out, fallback_rotation());
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let music = vec![item("m1", Category::Music), item("m2", Category::Music)];
        let ads = vec![item("a1", Category::Ad), item("a2", Category::Ad), item("a3", Category::Ad)];
        let anns = vec![item("n1", Category::Announcement)];
        let cfg = RotationConfig::default();

        let first = build_rotation(&music, &ads, &anns, &cfg);
        let second = build_rotation(&music, &ads, &anns, &cfg);
        assert_eq!(first, second);
    }

    #[test]
    fn default_items_keep_their_category() {
        for c in Category::ALL {
            assert_eq!(default_item(c).category, c);
        }
    }
}
