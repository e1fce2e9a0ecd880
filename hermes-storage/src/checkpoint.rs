// Keyed, crash-consistent checkpoint store (spec §4.3): `stream_id ->
// last_flushed_seq`, backed by `redb`. Sessions are single-shot (spec.md
// §1), so this isn't consulted to resume a session — it exists so a
// restart can still report `reported_gaps` consistently (spec §8,
// invariant 5) against whatever was durably flushed.

use redb::{Database, ReadableTable, TableDefinition};

use hermes_base::{err_kind, Error, ErrorKind};

const CHECKPOINTS: TableDefinition<&str, u64> = TableDefinition::new("checkpoints");

pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let db = Database::create(path)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("open checkpoint db: {e}")))?;
        Ok(CheckpointStore { db })
    }

    /// Key is `"{node_id}/{stream_id}"`, mirroring `GlobalNodeId`'s display
    /// form so checkpoints stay unambiguous across Nodes sharing a stream
    /// name.
    pub fn record_flush(&self, key: &str, last_flushed_seq: u64) -> Result<(), Error> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("begin checkpoint write: {e}")))?;
        {
            let mut table = write_txn
                .open_table(CHECKPOINTS)
                .map_err(|e| err_kind(ErrorKind::Fatal, format!("open checkpoint table: {e}")))?;
            table
                .insert(key, last_flushed_seq)
                .map_err(|e| err_kind(ErrorKind::Fatal, format!("insert checkpoint: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("commit checkpoint: {e}")))
    }

    pub fn last_flushed_seq(&self, key: &str) -> Result<Option<u64>, Error> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("begin checkpoint read: {e}")))?;
        let table = match read_txn.open_table(CHECKPOINTS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(err_kind(ErrorKind::Fatal, format!("open checkpoint table: {e}"))),
        };
        table
            .get(key)
            .map_err(|e| err_kind(ErrorKind::Fatal, format!("get checkpoint: {e}")))
            .map(|v| v.map(|g| g.value()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("checkpoints.redb")).unwrap();
        assert_eq!(store.last_flushed_seq("node/stream").unwrap(), None);
        store.record_flush("node/stream", 42).unwrap();
        assert_eq!(store.last_flushed_seq("node/stream").unwrap(), Some(42));
        store.record_flush("node/stream", 99).unwrap();
        assert_eq!(store.last_flushed_seq("node/stream").unwrap(), Some(99));
    }
}
