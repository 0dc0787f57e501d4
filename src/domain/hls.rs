use std::fmt::Write as _;
use std::path::Path;

/// One encoded segment of a variant, as reported by the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub uri: String,
    pub duration: f64,
}

pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<SegmentEntry>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
            playlist_type: None,
        }
    }

    /// VOD playlist whose target duration covers the longest segment.
    pub fn vod(segments: Vec<SegmentEntry>) -> Self {
        let longest = segments
            .iter()
            .map(|segment| segment.duration)
            .fold(0.0_f64, f64::max);
        let mut playlist = Self::new(longest.ceil() as u64);
        playlist.playlist_type = Some("VOD".to_string());
        playlist.segments = segments;
        playlist
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);
        if let Some(pt) = &self.playlist_type {
            let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{}", pt);
        }
        for segment in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
            out.push_str(&segment.uri);
            out.push('\n');
        }
        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        tokio::fs::write(path, self.render()).await
    }
}
