// Tabular container (spec §4.3). Deliberately simplified relative to the
// teacher's LSM-and-dictionary-encoded column store: one directory per
// node ("group"), one append-only row file per stream ("dataset"), and a
// single metadata file at the container root recording `session_id`,
// `started_at_reference_ns`, and per-stream schemas (spec §6). No dictionary
// encoding, no block/chunk layering — rows are length-prefixed msgpack,
// appended in flush order.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::{NodeId, StreamId, StreamSchema};

use crate::ioutil::AppendWriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub started_at_reference_ns: i64,
    pub host_id: String,
    pub broker_id: String,
    pub config_digest: String,
    pub streams: Vec<StreamSchema>,
}

/// One length-prefixed row: `reference_ts_ns` plus the tabular payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub reference_ts_ns: i64,
    pub values: Vec<f64>,
}

pub struct TabularContainer {
    root_dir: PathBuf,
    writers: HashMap<(NodeId, StreamId), AppendWriter>,
}

impl TabularContainer {
    /// Create the container root and write its metadata file. Fails if the
    /// root already contains a metadata file (one container per session).
    pub fn create(root_dir: impl AsRef<Path>, metadata: &SessionMetadata) -> Result<Self, Error> {
        let root_dir = root_dir.as_ref().to_owned();
        fs::create_dir_all(&root_dir)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("create container root: {e}")))?;
        let metadata_path = root_dir.join("metadata.msgpack");
        let bytes = rmp_serde::to_vec(metadata).map_err(Error::from)?;
        fs::write(&metadata_path, bytes)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("write metadata: {e}")))?;
        Ok(TabularContainer {
            root_dir,
            writers: HashMap::new(),
        })
    }

    fn dataset_path(&self, node_id: &NodeId, stream_id: &StreamId) -> PathBuf {
        self.root_dir.join(node_id.to_string()).join(format!("{stream_id}.dataset"))
    }

    fn writer_for(&mut self, node_id: &NodeId, stream_id: &StreamId) -> Result<&mut AppendWriter, Error> {
        let key = (node_id.clone(), stream_id.clone());
        if !self.writers.contains_key(&key) {
            let path = self.dataset_path(node_id, stream_id);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .map_err(|e| err_kind(ErrorKind::Fatal, format!("create node group: {e}")))?;
            }
            let writer = AppendWriter::create_new(&path)
                .map_err(|e| err_kind(ErrorKind::Fatal, format!("open dataset {path:?}: {e}")))?;
            self.writers.insert(key.clone(), writer);
        }
        Ok(self.writers.get_mut(&key).expect("just inserted"))
    }

    /// Append one row of an incremental flush (spec §4.3: "flushing is
    /// always incremental").
    pub fn append_row(
        &mut self,
        node_id: &NodeId,
        stream_id: &StreamId,
        row: &Row,
    ) -> Result<(), Error> {
        let bytes = rmp_serde::to_vec(row).map_err(Error::from)?;
        let writer = self.writer_for(node_id, stream_id)?;
        writer
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .and_then(|_| writer.write_all(&bytes))
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("append row: {e}")))
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| err_kind(ErrorKind::Fatal, format!("flush: {e}")))?;
        }
        Ok(())
    }

    /// Final flush at `DRAIN` (spec §4.3): flush and fsync every open
    /// dataset so the container is durable before the Node reports `DONE`.
    pub fn sync(&mut self) -> Result<(), Error> {
        for writer in self.writers.values_mut() {
            writer
                .sync()
                .map_err(|e| err_kind(ErrorKind::Fatal, format!("sync: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            session_id: "s1".into(),
            started_at_reference_ns: 0,
            host_id: "host-a".into(),
            broker_id: "a".into(),
            config_digest: "deadbeef".into(),
            streams: vec![],
        }
    }

    #[test]
    fn create_writes_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        TabularContainer::create(dir.path(), &metadata()).unwrap();
        assert!(dir.path().join("metadata.msgpack").exists());
    }

    #[test]
    fn metadata_round_trips_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = metadata();
        meta.session_id = "session-abc123".into();
        meta.started_at_reference_ns = 1_234_567_890;
        meta.streams = vec![StreamSchema {
            stream_id: StreamId::from("imu0"),
            device_id: hermes_proto::DeviceId::from("imu-dev"),
            node_id: NodeId::from("imu_node"),
            nominal_rate_hz: 100.0,
            is_burst: false,
            is_video: false,
            channel_names: vec!["x".into(), "y".into(), "z".into()],
        }];
        TabularContainer::create(dir.path(), &meta).unwrap();
        let bytes = fs::read(dir.path().join("metadata.msgpack")).unwrap();
        let read_back: SessionMetadata = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(read_back.session_id, meta.session_id);
        assert_eq!(read_back.started_at_reference_ns, meta.started_at_reference_ns);
        assert_eq!(read_back.streams, meta.streams);
    }

    #[test]
    fn append_row_creates_one_dataset_per_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut container = TabularContainer::create(dir.path(), &metadata()).unwrap();
        let node = NodeId::from("imu_node");
        let stream = StreamId::from("imu0");
        container
            .append_row(&node, &stream, &Row { reference_ts_ns: 1, values: vec![1.0, 2.0] })
            .unwrap();
        container
            .append_row(&node, &stream, &Row { reference_ts_ns: 2, values: vec![3.0, 4.0] })
            .unwrap();
        container.sync().unwrap();
        let path = dir.path().join("imu_node").join("imu0.dataset");
        assert!(path.exists());
        assert!(fs::metadata(path).unwrap().len() > 0);
    }
}
