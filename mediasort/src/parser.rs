//! Release-name parsing using regex
//!
//! Pulls title, season/episode, year, quality and release group out of
//! scene-style names such as `The.Pitt.S01E10.1080p.WEB-DL.x265-GROUP.mkv`.

use regex::{Match, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StabilityError};

/// Resolution tags preferred over source tags, best first
const RESOLUTION_PREFERENCE: &[&str] = &["2160p", "4K", "UHD", "1080p", "720p", "480p"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMedia {
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u32>,
    pub quality: Option<String>,
    pub release_group: Option<String>,
    pub is_tv_show: bool,
}

impl fmt::Display for ParsedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tv_show {
            match (self.season, self.episode) {
                (Some(s), Some(e)) => write!(f, "TV Show - \"{}\" S{:02}E{:02}", self.title, s, e),
                (Some(s), None) => write!(f, "TV Show - \"{}\" S{:02} (Season Pack)", self.title, s),
                _ => write!(f, "TV Show - \"{}\"", self.title),
            }
        } else {
            write!(f, "Movie - \"{}\"", self.title)?;
            if let Some(year) = self.year {
                write!(f, " ({})", year)?;
            }
            Ok(())
        }
    }
}

pub struct FilenameParser {
    extension: Regex,
    site: Vec<Regex>,
    season_episode: Vec<Regex>,
    season_only: Vec<Regex>,
    year: Regex,
    quality: Regex,
    release_group: Regex,
    junk: Vec<Regex>,
    separators: Regex,
    whitespace: Regex,
    special: Regex,
}

impl FilenameParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            extension: Regex::new(r"\.([A-Za-z][A-Za-z0-9]{1,3})$")?,
            site: compile_all(&[
                r"(?i)^www\.[a-z0-9]+\.(?:org|com|net)[\s._-]+",
                r"^\[[A-Za-z0-9._-]+\]",
                r"(?i)[\s._-]+\[?[a-z0-9]*\.to\b\]?",
            ])?,
            season_episode: compile_all(&[
                r"[Ss]([0-9]{1,2})[Ee]([0-9]{1,3})",
                r"([0-9]{1,2})[xX]([0-9]{1,3})",
                r"[Ss]eason[\s._-]?([0-9]{1,2})[\s._-]?[Ee]pisode[\s._-]?([0-9]{1,3})",
            ])?,
            // The first pattern must not be followed by an episode marker;
            // that check happens in `find_season_only`.
            season_only: compile_all(&[
                r"\b[Ss]([0-9]{1,2})(?:\s+|[._-]+|$)",
                r"\b[Ss]([0-9]{1,2})(?:[\s._-]*[-–>]+[\s._-]*[Ss]?[0-9]{1,2})+",
                r"\b[Ss]eason[\s._-]?([0-9]{1,2})\b",
                r"\b[Ss]eason[\s._-]?[0-9]{1,2}[\s._-]*-[\s._-]*[0-9]{1,2}",
                r"(?i)\b(?:Complete|Full|Entire)[\s._-]+(?:Series|Seasons?)\b",
                r"\b[Ss][0-9]{1,2}(?:[\s._-]*-[\s._-]*[Ss][0-9]{1,2}){2,}",
            ])?,
            year: Regex::new(r"(?:19|20)[0-9]{2}")?,
            quality: Regex::new(
                r"(?i)(2160p|1080p|720p|480p|4K|UHD|HDR|HDR10|WEB-?DL|WEBRip|BluRay|BRrip|BDRip|DVDRip)",
            )?,
            release_group: Regex::new(r"[-\[]([A-Za-z0-9]+)(?:\]|\[.*?\])?$")?,
            junk: compile_all(&[
                r"(?i)\b(?:HEVC|x264|x265|h\.?264|h\.?265|10bit|8bit)\b",
                r"(?i)\b(?:DDP5\.1|DD5\.1|AAC|AC3|Atmos|TrueHD)\b",
                r"\b(?:AMZN|NF|DSNP|HMAX|ATVP)\b",
            ])?,
            separators: Regex::new(r"[._-]+")?,
            whitespace: Regex::new(r"\s+")?,
            special: Regex::new(r"[^\w\s'\-]")?,
        })
    }

    /// Parse a file or folder name
    pub fn parse(&self, name: &str) -> ParsedMedia {
        let mut name = self.strip_extension(name);
        for pattern in &self.site {
            name = pattern.replace_all(&name, "").into_owned();
        }

        let (mut season, episode) = self.season_episode(&name);
        let mut is_tv_show = season.is_some() && episode.is_some();

        if !is_tv_show && self.is_season_pack(&name) {
            is_tv_show = true;
            if season.is_none() {
                season = self.season_from_pack(&name);
            }
        }

        let year = self.extract_year(&name);
        let quality = self.extract_quality(&name);
        let release_group = self
            .release_group
            .captures(&name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let title = self.extract_title(&name, season, episode, year);

        ParsedMedia {
            title,
            season,
            episode,
            year,
            quality,
            release_group,
            is_tv_show,
        }
    }

    /// Drop a trailing extension unless it looks like part of the release name
    fn strip_extension(&self, name: &str) -> String {
        if let Some(caps) = self.extension.captures(name) {
            if let (Some(whole), Some(ext)) = (caps.get(0), caps.get(1)) {
                let ext = ext.as_str();
                let season_token = ext.len() > 1
                    && matches!(ext.as_bytes()[0], b'S' | b's' | b'E' | b'e')
                    && ext[1..].bytes().all(|b| b.is_ascii_digit());
                if !season_token && !self.quality.is_match(ext) {
                    return name[..whole.start()].to_string();
                }
            }
        }
        name.to_string()
    }

    fn season_episode(&self, name: &str) -> (Option<u32>, Option<u32>) {
        for pattern in &self.season_episode {
            if let Some(caps) = pattern.captures(name) {
                let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
                let episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
                return (season, episode);
            }
        }
        (None, None)
    }

    /// First match of a season-only pattern, honoring the episode guard
    fn find_season_only<'t>(&self, index: usize, text: &'t str) -> Option<regex::Captures<'t>> {
        let pattern = &self.season_only[index];
        if index != 0 {
            return pattern.captures(text);
        }
        pattern.captures_iter(text).find(|caps| {
            caps.get(0)
                .map(|m| !starts_with_episode_marker(&text[m.end()..]))
                .unwrap_or(false)
        })
    }

    fn is_season_pack(&self, name: &str) -> bool {
        (0..self.season_only.len()).any(|i| self.find_season_only(i, name).is_some())
    }

    fn season_from_pack(&self, name: &str) -> Option<u32> {
        (0..self.season_only.len()).find_map(|i| {
            self.find_season_only(i, name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }

    fn extract_year(&self, name: &str) -> Option<u32> {
        let matches: Vec<Match> = self.year.find_iter(name).collect();
        let chosen = match matches.as_slice() {
            [] => return None,
            [only] => only,
            // A year near the start is probably the title ("1917")
            [first, second, ..] if first.start() < 10 => second,
            [first, ..] => first,
        };
        chosen.as_str().parse().ok()
    }

    fn extract_quality(&self, name: &str) -> Option<String> {
        let found: Vec<&str> = self.quality.find_iter(name).map(|m| m.as_str()).collect();
        RESOLUTION_PREFERENCE
            .iter()
            .find_map(|res| found.iter().find(|q| q.eq_ignore_ascii_case(res)))
            .or_else(|| found.first())
            .map(|q| q.to_string())
    }

    fn extract_title(&self, name: &str, season: Option<u32>, episode: Option<u32>, year: Option<u32>) -> String {
        let mut title = name;

        if let Some(m) = self.season_episode.iter().find_map(|p| p.find(title)) {
            title = &title[..m.start()];
        }

        let has_episode = matches!((season, episode), (Some(s), Some(e)) if s > 0 && e > 0);

        if !has_episode {
            let earliest = (0..self.season_only.len())
                .filter_map(|i| self.find_season_only(i, title).and_then(|c| c.get(0)))
                .map(|m| m.start())
                .min();
            if let Some(start) = earliest {
                title = &title[..start];
            }

            if year.is_some() {
                if let Some(last) = self.year.find_iter(title).last() {
                    title = &title[..last.start()];
                }
            }
        }

        let with_years = title.to_string();

        let mut cleaned = self.year.replace_all(title, "").into_owned();
        for pattern in &self.junk {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        cleaned = self.quality.replace_all(&cleaned, "").into_owned();

        let mut result = self.tidy(&cleaned);
        if result.is_empty() {
            // The title itself was a year
            result = self.tidy(&with_years);
        }
        title_case(&result)
    }

    fn tidy(&self, text: &str) -> String {
        let spaced = self.separators.replace_all(text, " ");
        let collapsed = self.whitespace.replace_all(&spaced, " ");
        self.special.replace_all(&collapsed, "").trim().to_string()
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed
pub fn normalize_title(title: &str) -> String {
    let spaced: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(StabilityError::from))
        .collect()
}

fn starts_with_episode_marker(rest: &str) -> bool {
    let mut chars = rest.chars();
    matches!(chars.next(), Some('E' | 'e')) && chars.next().map(|c| c.is_ascii_digit()).unwrap_or(false)
}

/// Capitalize the first letter of every word, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    for c in text.chars() {
        let word_start = match previous {
            None => true,
            Some(p) => !(p.is_alphanumeric() || p == '\''),
        };
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        previous = Some(c);
    }
    out
}
