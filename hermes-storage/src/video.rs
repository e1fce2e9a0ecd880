// Video side-car files (spec §4.3): video streams bypass the tabular
// container and stream into one file per camera, plus a parallel index
// mapping `(frame_no, reference_ts_ns, device_pts)`. Codec selection is an
// external collaborator's concern (spec §1); this writer only appends
// whatever already-encoded frame bytes it's given.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hermes_base::{err_kind, Error, ErrorKind};

use crate::ioutil::AppendWriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub frame_no: u64,
    pub reference_ts_ns: i64,
    pub device_pts: Option<i64>,
}

pub struct VideoSidecar {
    frames: AppendWriter,
    index: AppendWriter,
    next_frame_no: u64,
}

impl VideoSidecar {
    pub fn create(root_dir: impl AsRef<Path>, stream_id: &str) -> Result<Self, Error> {
        let root_dir = root_dir.as_ref();
        std::fs::create_dir_all(root_dir)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("create video root: {e}")))?;
        let frames_path: PathBuf = root_dir.join(format!("{stream_id}.video"));
        let index_path: PathBuf = root_dir.join(format!("{stream_id}.index"));
        let frames = AppendWriter::create_new(frames_path)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("open video file: {e}")))?;
        let index = AppendWriter::create_new(index_path)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("open video index: {e}")))?;
        Ok(VideoSidecar {
            frames,
            index,
            next_frame_no: 0,
        })
    }

    /// Append one already-encoded frame and its index entry.
    pub fn append_frame(
        &mut self,
        reference_ts_ns: i64,
        device_pts: Option<i64>,
        encoded_frame: &[u8],
    ) -> Result<(), Error> {
        self.frames
            .write_all(&(encoded_frame.len() as u64).to_le_bytes())
            .and_then(|_| self.frames.write_all(encoded_frame))
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("append frame: {e}")))?;

        let entry = IndexEntry {
            frame_no: self.next_frame_no,
            reference_ts_ns,
            device_pts,
        };
        let bytes = rmp_serde::to_vec(&entry).map_err(Error::from)?;
        self.index
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .and_then(|_| self.index.write_all(&bytes))
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("append index entry: {e}")))?;

        self.next_frame_no += 1;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<(), Error> {
        self.frames
            .sync()
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("sync video: {e}")))?;
        self.index
            .sync()
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("sync index: {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_numbers_increment_per_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut sidecar = VideoSidecar::create(dir.path(), "cam0").unwrap();
        assert_eq!(sidecar.next_frame_no, 0);
        sidecar.append_frame(100, Some(1), &[1, 2, 3]).unwrap();
        assert_eq!(sidecar.next_frame_no, 1);
        sidecar.append_frame(200, None, &[4, 5, 6]).unwrap();
        assert_eq!(sidecar.next_frame_no, 2);
        sidecar.sync().unwrap();
    }
}
