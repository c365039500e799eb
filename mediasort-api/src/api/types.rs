use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A folder entry from `/rest/config/folders`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncthingFolder {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub paused: bool,
}

/// Response of `/rest/db/need`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeedResponse {
    /// Files currently being pulled
    #[serde(default)]
    pub progress: Vec<NeedEntry>,
    /// Files queued but not started
    #[serde(default)]
    pub queued: Vec<NeedEntry>,
    /// Everything else still needed
    #[serde(default)]
    pub rest: Vec<NeedEntry>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub perpage: Option<u32>,
}

impl NeedResponse {
    /// Entries across all three need categories
    pub fn all_entries(&self) -> impl Iterator<Item = &NeedEntry> {
        self.progress
            .iter()
            .chain(self.queued.iter())
            .chain(self.rest.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// One node of `/rest/db/browse`, children included when the entry is a directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub children: Vec<BrowseEntry>,
}

impl BrowseEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "FILE_INFO_TYPE_FILE" || self.kind == "file"
    }

    pub fn is_directory(&self) -> bool {
        self.kind == "FILE_INFO_TYPE_DIRECTORY" || self.kind == "directory"
    }
}

/// Subset of `/rest/db/status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub need_files: u64,
    #[serde(default)]
    pub need_bytes: u64,
    #[serde(default)]
    pub pull_errors: u64,
}

/// A download job reported by ruTorrent's httprpc `list` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJobRecord {
    pub hash: String,
    pub name: String,
    pub size_bytes: u64,
    pub size_chunks: u64,
    pub completed_chunks: u64,
    pub bytes_done: u64,
    pub label: String,
    pub base_path: String,
}

impl RemoteJobRecord {
    const IDX_NAME: usize = 4;
    const IDX_SIZE_BYTES: usize = 5;
    const IDX_SIZE_CHUNKS: usize = 6;
    const IDX_COMPLETED_CHUNKS: usize = 7;
    const IDX_BYTES_DONE: usize = 8;
    const IDX_LABEL: usize = 14;
    const IDX_BASE_PATH: usize = 25;

    /// Parse a positional record. Fields past the base path are ignored.
    pub fn from_fields(hash: &str, fields: &[Value]) -> Result<Self, String> {
        Ok(Self {
            hash: hash.to_string(),
            name: text_field(fields, Self::IDX_NAME)?,
            size_bytes: numeric_field(fields, Self::IDX_SIZE_BYTES)?,
            size_chunks: numeric_field(fields, Self::IDX_SIZE_CHUNKS)?,
            completed_chunks: numeric_field(fields, Self::IDX_COMPLETED_CHUNKS)?,
            bytes_done: numeric_field(fields, Self::IDX_BYTES_DONE)?,
            label: text_field(fields, Self::IDX_LABEL).unwrap_or_default(),
            base_path: text_field(fields, Self::IDX_BASE_PATH)?,
        })
    }

    /// Complete only when every chunk is done and the byte counts agree.
    pub fn is_complete(&self) -> bool {
        self.completed_chunks == self.size_chunks && self.bytes_done == self.size_bytes
    }

    pub fn progress(&self) -> f64 {
        if self.size_chunks == 0 {
            0.0
        } else {
            self.completed_chunks as f64 / self.size_chunks as f64 * 100.0
        }
    }

    /// Terminal segment of the base path
    pub fn folder_name(&self) -> &str {
        self.base_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

fn text_field(fields: &[Value], index: usize) -> Result<String, String> {
    match fields.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Ok(other.to_string()),
        None => Err(format!("missing field {}", index)),
    }
}

fn numeric_field(fields: &[Value], index: usize) -> Result<u64, String> {
    match fields.get(index) {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("field {} is not a number ({:?}): {}", index, s, e)),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| format!("field {} is not an unsigned integer", index)),
        Some(other) => Err(format!("field {} has unexpected type: {}", index, other)),
        None => Err(format!("missing field {}", index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(name: &str, size: u64, chunks: u64, done_chunks: u64, done: u64, path: &str) -> Vec<Value> {
        let mut values: Vec<Value> = (0..30).map(|i| json!(i.to_string())).collect();
        values[4] = json!(name);
        values[5] = json!(size.to_string());
        values[6] = json!(chunks.to_string());
        values[7] = json!(done_chunks.to_string());
        values[8] = json!(done.to_string());
        values[14] = json!("tv");
        values[25] = json!(path);
        values
    }

    #[test]
    fn test_parse_complete_record() {
        let record = RemoteJobRecord::from_fields(
            "ABC",
            &fields("Show.S01", 1000, 4, 4, 1000, "/downloads/TV_Shows/Show.S01"),
        )
        .unwrap();

        assert!(record.is_complete());
        assert_eq!(record.folder_name(), "Show.S01");
        assert_eq!(record.label, "tv");
        assert!((record.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_chunks_done_but_bytes_differ_is_incomplete() {
        let record = RemoteJobRecord::from_fields(
            "ABC",
            &fields("Movie", 1000, 4, 4, 990, "/downloads/Movies/Movie"),
        )
        .unwrap();
        assert!(!record.is_complete());
    }

    #[test]
    fn test_short_record_is_rejected() {
        let short: Vec<Value> = (0..10).map(|i| json!(i.to_string())).collect();
        assert!(RemoteJobRecord::from_fields("ABC", &short).is_err());
    }

    #[test]
    fn test_trailing_fields_are_tolerated() {
        let mut values = fields("Movie", 10, 1, 0, 0, "/downloads/Movie/");
        values.extend((0..20).map(|i| json!(format!("extra{}", i))));
        let record = RemoteJobRecord::from_fields("ABC", &values).unwrap();
        assert_eq!(record.folder_name(), "Movie");
        assert_eq!(record.progress(), 0.0);
    }

    #[test]
    fn test_need_entries_span_all_categories() {
        let need: NeedResponse = serde_json::from_value(json!({
            "progress": [{"name": "a/1.mkv", "size": 10}],
            "queued": [{"name": "a/2.srt", "size": 2}],
            "rest": [{"name": "b/3.mkv", "size": 5}],
            "page": 1,
            "perpage": 100
        }))
        .unwrap();
        assert_eq!(need.all_entries().count(), 3);
    }
}
