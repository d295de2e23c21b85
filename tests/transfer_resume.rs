//! End-to-end resume behavior of the transfer engine without any network
//! dependency: a fake `Transferer` plus the real `StateManager`/checkpoint
//! plumbing, mirroring `adlfs/tests/test_multithread.py`'s style of
//! stubbing the transfer callable rather than hitting a live store.

use adls_rs::path::Path;
use adls_rs::transfer::checkpoint::{Checkpoint, CheckpointStore};
use adls_rs::transfer::{Chunk, FileTransfer, Merger, TransferClient, Transferer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

struct CountingTransferer {
    calls: Mutex<Vec<u64>>,
}

#[async_trait]
impl Transferer for CountingTransferer {
    async fn transfer_chunk(&self, chunk: &Chunk) -> adls_rs::error::Result<()> {
        self.calls.lock().push(chunk.offset);
        Ok(())
    }
}

struct NoopMerger;
#[async_trait]
impl Merger for NoopMerger {
    async fn merge(&self, _dst: &Path, _parts: &[Path]) -> adls_rs::error::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn resumed_chunks_are_not_retransferred() {
    let transferer = Arc::new(CountingTransferer {
        calls: Mutex::new(Vec::new()),
    });
    let client = TransferClient::new(transferer.clone(), Some(Arc::new(NoopMerger)), 10, 4);

    // A prior run already finished the chunk at offset 0; only offset 10
    // and 20 should be dispatched to the transferer this time.
    client.submit(
        FileTransfer {
            src: Path::new("/local/big.bin"),
            dst: Path::new("/remote/big.bin"),
            size: 25,
        },
        &[0],
    );

    let progress = client.run().await.unwrap();
    assert_eq!(progress.chunks_total, 3);
    assert_eq!(progress.chunks_done, 3);

    let mut called: Vec<u64> = transferer.calls.lock().clone();
    called.sort();
    assert_eq!(called, vec![10, 20]);
}

#[test]
fn checkpoint_roundtrips_done_offsets_from_a_client() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().to_path_buf(), "resume-test".to_string());

    let mut cp = Checkpoint::default();
    cp.done_chunks.insert("/remote/big.bin".to_string(), vec![0, 10]);
    store.save(&cp).unwrap();

    let loaded = store.load();
    assert_eq!(
        loaded.done_chunks.get("/remote/big.bin"),
        Some(&vec![0, 10])
    );
}
