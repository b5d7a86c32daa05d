use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content category of a schedulable item.
///
/// The wire names match what the catalog stores (`music`, `ad`,
/// `announcement`, `time_signal`); `time` is accepted as an alias because
/// older catalogs tagged hour announcements that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Music,
    Ad,
    Announcement,
    #[serde(alias = "time")]
    TimeSignal,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Music,
        Category::Ad,
        Category::Announcement,
        Category::TimeSignal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Music => "music",
            Category::Ad => "ad",
            Category::Announcement => "announcement",
            Category::TimeSignal => "time_signal",
        }
    }

    /// Short log tag, in the style of a station log ("MUS", "ADV", ...).
    pub fn tag(self) -> &'static str {
        match self {
            Category::Music => "MUS",
            Category::Ad => "ADV",
            Category::Announcement => "ANN",
            Category::TimeSignal => "TOH",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "music" => Ok(Category::Music),
            "ad" => Ok(Category::Ad),
            "announcement" => Ok(Category::Announcement),
            "time_signal" | "time" => Ok(Category::TimeSignal),
            other => Err(format!("unknown content category: {other}")),
        }
    }
}

/// A schedulable unit of audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    pub url: String,
    pub category: Category,
    /// Seconds; 0 when unknown.
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub play_count: u64,
}

impl ContentItem {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "Unknown",
        }
    }

    pub fn display_artist(&self) -> &str {
        match self.artist.as_deref() {
            Some(a) if !a.trim().is_empty() => a,
            _ => "---",
        }
    }
}

/// Per-category counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub music: u64,
    pub ad: u64,
    pub announcement: u64,
    pub time_signal: u64,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Music => self.music,
            Category::Ad => self.ad,
            Category::Announcement => self.announcement,
            Category::TimeSignal => self.time_signal,
        }
    }

    pub fn bump(&mut self, category: Category) {
        self.add(category, 1);
    }

    pub fn add(&mut self, category: Category, n: u64) {
        let slot = match category {
            Category::Music => &mut self.music,
            Category::Ad => &mut self.ad,
            Category::Announcement => &mut self.announcement,
            Category::TimeSignal => &mut self.time_signal,
        };
        *slot = slot.saturating_add(n);
    }
}

/// Session statistics exposed to the UI (`getStats`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub total_played: u64,
    pub played: CategoryCounts,
    pub uptime_sec: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_accepts_legacy_time_tag() {
        let c: Category = serde_json::from_str("\"time\"").unwrap();
        assert_eq!(c, Category::TimeSignal);
        assert_eq!("TIME".parse::<Category>().unwrap(), Category::TimeSignal);
        assert_eq!(serde_json::to_string(&Category::TimeSignal).unwrap(), "\"time_signal\"");
        assert!("jingle".parse::<Category>().is_err());
    }

    #[test]
    fn missing_display_fields_fall_back() {
        let item = ContentItem {
            id: "x".into(),
            title: Some("   ".into()),
            artist: None,
            url: "https://cdn.example/x.mp3".into(),
            category: Category::Music,
            duration_seconds: 0,
            play_count: 0,
        };
        assert_eq!(item.display_title(), "Unknown");
        assert_eq!(item.display_artist(), "---");
    }

    #[test]
    fn counts_bump_per_category() {
        let mut c = CategoryCounts::default();
        c.bump(Category::Music);
        c.bump(Category::Music);
        c.bump(Category::Ad);
        assert_eq!(c.get(Category::Music), 2);
        assert_eq!(c.get(Category::Ad), 1);
        assert_eq!(c.get(Category::Announcement), 0);
    }
}
