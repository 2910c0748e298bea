use serde::Serialize;

use crate::domain::{
    errors::StorageError,
    value_objects::{BucketName, ObjectKey},
};

/// A part committed to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRecord {
    pub part_number: u32,
    pub checksum_tag: String,
    pub byte_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Open,
    Completed,
    Aborted,
}

/// Book-keeping for one multipart upload.
///
/// Part numbers form the contiguous sequence `1..=n`. Parts may be recorded
/// out of order when they are dispatched concurrently, but the session only
/// becomes completable once every number up to the highest has a tag.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub bucket: BucketName,
    pub key: ObjectKey,
    parts: Vec<Option<PartRecord>>,
    state: SessionState,
}

impl UploadSession {
    pub fn open(upload_id: String, bucket: BucketName, key: ObjectKey) -> Self {
        Self {
            upload_id,
            bucket,
            key,
            parts: Vec::new(),
            state: SessionState::Open,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reserve the next part number, in read order
    pub fn next_part_number(&mut self) -> u32 {
        self.parts.push(None);
        self.parts.len() as u32
    }

    /// Record the tag the store returned for a reserved part
    pub fn record_part(&mut self, record: PartRecord) -> Result<(), StorageError> {
        if self.state != SessionState::Open {
            return Err(StorageError::Conflict {
                message: format!("upload '{}' is no longer open", self.upload_id),
            });
        }
        if record.byte_length == 0 {
            return Err(StorageError::invalid_input(format!(
                "part {} is empty",
                record.part_number
            )));
        }

        let index = (record.part_number as usize)
            .checked_sub(1)
            .filter(|index| *index < self.parts.len())
            .ok_or_else(|| {
                StorageError::invalid_input(format!(
                    "part number {} was never reserved",
                    record.part_number
                ))
            })?;

        self.parts[index] = Some(record);
        Ok(())
    }

    pub fn committed_parts(&self) -> usize {
        self.parts.iter().filter(|part| part.is_some()).count()
    }

    pub fn bytes_committed(&self) -> u64 {
        self.parts.iter().flatten().map(|part| part.byte_length).sum()
    }

    /// Parts in ascending order, once every reserved part has a tag
    pub fn completion_parts(&self) -> Result<Vec<PartRecord>, StorageError> {
        if self.parts.is_empty() {
            return Err(StorageError::invalid_input(
                "a multipart upload needs at least one part",
            ));
        }

        self.parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                part.clone().ok_or_else(|| {
                    StorageError::invalid_input(format!("part {} has no checksum tag", index + 1))
                })
            })
            .collect()
    }

    pub fn mark_completed(&mut self) {
        self.state = SessionState::Completed;
    }

    pub fn mark_aborted(&mut self) {
        self.state = SessionState::Aborted;
    }
}

/// Progress snapshot handed to upload observers after each committed part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: Option<u64>,
    pub parts_committed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::open(
            "upload-1".to_string(),
            BucketName::new("media").unwrap(),
            ObjectKey::new("video.mp4").unwrap(),
        )
    }

    fn part(part_number: u32, byte_length: u64) -> PartRecord {
        PartRecord {
            part_number,
            checksum_tag: format!("tag-{}", part_number),
            byte_length,
        }
    }

    #[test]
    fn test_parts_complete_in_ascending_order() {
        let mut session = session();
        assert_eq!(session.next_part_number(), 1);
        assert_eq!(session.next_part_number(), 2);

        // Concurrent dispatch can finish out of order
        session.record_part(part(2, 3)).unwrap();
        assert!(session.completion_parts().is_err());
        session.record_part(part(1, 5)).unwrap();

        let parts = session.completion_parts().unwrap();
        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(session.bytes_committed(), 8);
        assert_eq!(session.committed_parts(), 2);
    }

    #[test]
    fn test_rejects_unreserved_and_empty_parts() {
        let mut session = session();
        session.next_part_number();

        assert!(session.record_part(part(2, 1)).is_err());
        assert!(session.record_part(part(0, 1)).is_err());
        assert!(session.record_part(part(1, 0)).is_err());
    }

    #[test]
    fn test_closed_session_rejects_parts() {
        let mut session = session();
        session.next_part_number();
        session.mark_aborted();

        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.record_part(part(1, 1)).is_err());
        assert!(UploadSession::open(
            "empty".to_string(),
            BucketName::new("media").unwrap(),
            ObjectKey::new("x").unwrap()
        )
        .completion_parts()
        .is_err());
    }
}
