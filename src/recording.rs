use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use itertools::Itertools;

use crate::format::{MERGED, TokenValue};
use crate::fragment::{Fragment, ParseError};
use crate::metadata::Metadata;

/// The logical whole composed of one or more fragments sharing an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub id: String,
    /// Codec and creation timestamp shared by all fragments.
    /// The first-seen fragment's probed values win.
    pub metadata: Metadata,
    /// Fragments in aggregation order, which is lock-acquisition order.
    /// Sort by index when a deterministic order is needed.
    pub fragments: Vec<Fragment>,
    /// Highest fragment index seen so far.
    /// A best-effort estimate of the total, not a verified count.
    pub expected: u32,
    /// Canonical name for the merged output file, computed once.
    pub merged_name: Option<String>,
}

/// Aggregated recordings keyed by id, shared across concurrent parse tasks.
/// Every mutation runs inside one exclusive section.
#[derive(Debug, Default)]
pub struct RecordingList {
    recordings: Mutex<HashMap<String, Recording>>,
}

impl Recording {
    fn new(fragment: &Fragment) -> Self {
        Self {
            id: fragment.id.clone(),
            metadata: fragment.metadata.clone(),
            fragments: Vec::new(),
            expected: 0,
            merged_name: None,
        }
    }

    /// Fold one fragment into this recording.
    ///
    /// The fragment's timestamp is normalized to the recording's,
    /// so after aggregation every fragment carries the same creation time.
    fn fold(&mut self, mut fragment: Fragment) {
        if let Some(time) = self.metadata.creation_time {
            fragment.metadata.creation_time = Some(time);
        } else {
            self.metadata.creation_time = fragment.metadata.creation_time;
        }

        if fragment.metadata.codec != self.metadata.codec {
            crate::print_warning!(
                "Recording {}: fragment {} has codec '{}', expected '{}'",
                self.id,
                fragment.current_name,
                fragment.metadata.codec,
                self.metadata.codec
            );
        }

        self.fragments.push(fragment);

        if let Some(fragment) = self.fragments.last() {
            self.expected = self.expected.max(fragment.index);
            if self.merged_name.is_none() {
                self.merged_name = Some(MERGED.render(&[
                    TokenValue::Text(&self.metadata.creation_time_string()),
                    TokenValue::Text(&self.id),
                    TokenValue::Text(&fragment.extension),
                ]));
            }
        }
    }

    /// Fragments sorted by index, the intended concatenation order.
    #[must_use]
    pub fn fragments_in_order(&self) -> Vec<&Fragment> {
        self.fragments.iter().sorted_by_key(|fragment| fragment.index).collect()
    }

    /// Number of fragments still missing from the expected total.
    #[must_use]
    pub fn missing_fragments(&self) -> u32 {
        self.expected.saturating_sub(self.fragments.len() as u32)
    }

    /// Path for the merged output file inside the given directory.
    #[must_use]
    pub fn output_path(&self, output_dir: &Path) -> Option<PathBuf> {
        self.merged_name.as_ref().map(|name| output_dir.join(name))
    }
}

impl RecordingList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one directory entry and fold it into the aggregate.
    ///
    /// Safe to call from many tasks at once:
    /// parsing and probing run outside the lock,
    /// only the map mutation is serialized.
    /// A parse or probe failure leaves the shared state untouched.
    pub async fn add(&self, input_dir: &Path, name: &str) -> Result<(), ParseError> {
        let fragment = Fragment::parse(input_dir, name).await?;
        self.insert(fragment);
        Ok(())
    }

    /// Fold an already-parsed fragment into the aggregate.
    pub fn insert(&self, fragment: Fragment) {
        let mut recordings = self.recordings.lock().expect("Recording list mutex poisoned");
        let recording = recordings
            .entry(fragment.id.clone())
            .or_insert_with(|| Recording::new(&fragment));
        recording.fold(fragment);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recordings.lock().expect("Recording list mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recordings.lock().expect("Recording list mutex poisoned").is_empty()
    }

    /// Consume the aggregate and return recordings sorted by id.
    #[must_use]
    pub fn into_recordings(self) -> Vec<Recording> {
        self.recordings
            .into_inner()
            .expect("Recording list mutex poisoned")
            .into_values()
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .collect()
    }
}

#[cfg(test)]
mod recording_tests {
    use super::*;

    use chrono::{NaiveDate, NaiveDateTime};

    use crate::format::RENAMED;

    fn timestamp(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn fragment(id: &str, index: u32, time: Option<NaiveDateTime>, codec: &str) -> Fragment {
        let metadata = Metadata {
            codec: codec.to_string(),
            creation_time: time,
        };
        let new_name = RENAMED.render(&[
            TokenValue::Text(&metadata.creation_time_string()),
            TokenValue::Text(id),
            TokenValue::Number(index),
            TokenValue::Text("mp4"),
        ]);
        Fragment {
            id: id.to_string(),
            index,
            extension: "mp4".to_string(),
            current_name: format!("GX{index:02}{id}.mp4"),
            new_name,
            metadata,
        }
    }

    #[test]
    fn first_fragment_seeds_recording() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));

        let recordings = list.into_recordings();
        assert_eq!(recordings.len(), 1);

        let recording = &recordings[0];
        assert_eq!(recording.id, "0042");
        assert_eq!(recording.metadata.creation_time, Some(timestamp(1, 10)));
        assert_eq!(recording.fragments.len(), 1);
        assert_eq!(recording.expected, 1);
        assert_eq!(
            recording.merged_name.as_deref(),
            Some("Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042.mp4")
        );
    }

    #[test]
    fn first_seen_timestamp_wins() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0042", 2, Some(timestamp(2, 12)), "h264"));

        let recordings = list.into_recordings();
        let recording = &recordings[0];
        assert_eq!(recording.metadata.creation_time, Some(timestamp(1, 10)));
        for fragment in &recording.fragments {
            assert_eq!(fragment.metadata.creation_time, Some(timestamp(1, 10)));
        }
    }

    #[test]
    fn missing_timestamp_adopts_later_value() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, None, "h264"));
        list.insert(fragment("0042", 2, Some(timestamp(1, 10)), "h264"));

        let recordings = list.into_recordings();
        assert_eq!(recordings[0].metadata.creation_time, Some(timestamp(1, 10)));
    }

    #[test]
    fn expected_count_tracks_highest_index() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 3, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));

        let recordings = list.into_recordings();
        assert_eq!(recordings[0].expected, 3);
        assert_eq!(recordings[0].missing_fragments(), 1);
    }

    #[test]
    fn merged_name_is_computed_once() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0042", 2, Some(timestamp(2, 12)), "h264"));

        let recordings = list.into_recordings();
        assert_eq!(
            recordings[0].merged_name.as_deref(),
            Some("Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042.mp4")
        );
    }

    #[test]
    fn codec_mismatch_is_tolerated() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0042", 2, Some(timestamp(1, 10)), "hevc"));

        let recordings = list.into_recordings();
        assert_eq!(recordings[0].fragments.len(), 2);
        assert_eq!(recordings[0].metadata.codec, "h264");
    }

    #[test]
    fn separate_ids_stay_separate() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0137", 1, Some(timestamp(2, 12)), "h264"));

        assert_eq!(list.len(), 2);
        let recordings = list.into_recordings();
        assert_eq!(recordings[0].id, "0042");
        assert_eq!(recordings[1].id, "0137");
    }

    #[test]
    fn insert_order_does_not_change_final_state() {
        let fragments = [
            fragment("0042", 1, Some(timestamp(1, 10)), "h264"),
            fragment("0042", 2, Some(timestamp(1, 10)), "h264"),
            fragment("0042", 3, Some(timestamp(1, 10)), "h264"),
        ];

        let forward = RecordingList::new();
        for fragment in fragments.clone() {
            forward.insert(fragment);
        }
        let reversed = RecordingList::new();
        for fragment in fragments.into_iter().rev() {
            reversed.insert(fragment);
        }

        let forward = forward.into_recordings();
        let reversed = reversed.into_recordings();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].expected, reversed[0].expected);
        assert_eq!(forward[0].metadata, reversed[0].metadata);
        assert_eq!(forward[0].merged_name, reversed[0].merged_name);
        assert_eq!(
            forward[0].fragments_in_order(),
            reversed[0].fragments_in_order()
        );
    }

    #[test]
    fn concurrent_inserts_keep_aggregate_consistent() {
        let list = RecordingList::new();
        std::thread::scope(|scope| {
            for index in 1..=8 {
                let list = &list;
                scope.spawn(move || {
                    list.insert(fragment("0042", index, Some(timestamp(1, 10)), "h264"));
                });
            }
        });

        let recordings = list.into_recordings();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].fragments.len(), 8);
        assert_eq!(recordings[0].expected, 8);
        assert_eq!(recordings[0].missing_fragments(), 0);
        let ordered = recordings[0].fragments_in_order();
        let indices: Vec<u32> = ordered.iter().map(|fragment| fragment.index).collect();
        assert_eq!(indices, (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    fn fragments_in_order_sorts_by_index() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 2, Some(timestamp(1, 10)), "h264"));
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));

        let recordings = list.into_recordings();
        let ordered = recordings[0].fragments_in_order();
        assert_eq!(ordered[0].index, 1);
        assert_eq!(ordered[1].index, 2);
    }

    #[test]
    fn output_path_joins_merged_name() {
        let list = RecordingList::new();
        list.insert(fragment("0042", 1, Some(timestamp(1, 10)), "h264"));

        let recordings = list.into_recordings();
        let path = recordings[0].output_path(Path::new("/output")).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/output/Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042.mp4")
        );
    }
}
