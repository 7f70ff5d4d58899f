//! Reassembly Engine
//!
//! Receiving side of the chunked transfer. Chunks for a file may arrive in
//! any order, interleaved with other files, and concurrently. Each file name
//! owns one session guarded by its own async mutex; session lookup/creation,
//! slot write, completeness check, persist and removal all happen while that
//! mutex is held, so a file is persisted exactly once even when its last two
//! chunks land at the same instant.
//!
//! The table lock only guards lookup, insert and remove of session handles.
//! It is never held across an `.await`, so files never contend with each
//! other beyond a map access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_SIZE};
use crate::error::{Result, TransferError};
use crate::storage::{BlobStore, Metadata, ORIGINAL_EXTENSION_KEY};

use super::sender::chunk_count;
use super::types::{AssembledFile, Chunk, ChunkMessage, SessionProgress};

// ============================================================================
// Session
// ============================================================================

/// In-progress record of one file's chunks
struct TransferSession {
    total_chunks: usize,
    slots: Vec<Option<Bytes>>,
    received: usize,
    original_extension: String,
    last_activity: DateTime<Utc>,
    /// Set once the session left the table (persisted or evicted).
    /// A task that acquires a closed session must look the name up again.
    closed: bool,
}

impl TransferSession {
    fn new(total_chunks: usize, original_extension: &str) -> Self {
        Self {
            total_chunks,
            slots: vec![None; total_chunks],
            received: 0,
            original_extension: original_extension.to_string(),
            last_activity: Utc::now(),
            closed: false,
        }
    }

    /// Store a payload; re-delivery of an index overwrites it
    fn fill(&mut self, index: usize, payload: Bytes) {
        if self.slots[index].is_none() {
            self.received += 1;
        }
        self.slots[index] = Some(payload);
        self.last_activity = Utc::now();
    }

    fn is_complete(&self) -> bool {
        self.received == self.total_chunks
    }

    /// Concatenate slots in index order. Slots are left in place so a failed
    /// persist can be retried.
    fn assemble(&self) -> Bytes {
        let size = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut body = BytesMut::with_capacity(size);
        for slot in self.slots.iter().flatten() {
            body.extend_from_slice(slot);
        }
        body.freeze()
    }

    fn progress(&self) -> SessionProgress {
        SessionProgress {
            received: self.received,
            total_chunks: self.total_chunks,
        }
    }
}

type SessionHandle = Arc<Mutex<TransferSession>>;

// ============================================================================
// Engine
// ============================================================================

/// Collects chunks per file name and persists each completed file
#[derive(Clone)]
pub struct ReassemblyEngine {
    inner: Arc<EngineInner>,
    /// Largest `totalChunks` a session may declare; slots are allocated up front
    max_total_chunks: usize,
}

struct EngineInner {
    sessions: parking_lot::Mutex<HashMap<String, SessionHandle>>,
    store: Arc<dyn BlobStore>,
    session_ttl: Option<Duration>,
}

impl ReassemblyEngine {
    /// Create an engine that never evicts incomplete sessions
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_session_ttl(store, None)
    }

    /// Create an engine that evicts sessions idle for longer than `ttl`
    pub fn with_session_ttl(store: Arc<dyn BlobStore>, ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                sessions: parking_lot::Mutex::new(HashMap::new()),
                store,
                session_ttl: ttl,
            }),
            max_total_chunks: chunk_count(DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_CHUNK_SIZE),
        }
    }

    /// Cap the chunk count a single file may declare.
    ///
    /// Senders derive it from their upload limit and chunk size.
    pub fn with_max_total_chunks(mut self, max_total_chunks: usize) -> Self {
        self.max_total_chunks = max_total_chunks.max(1);
        self
    }

    /// Decode, validate and handle one channel payload
    pub async fn handle_message(&self, payload: &[u8]) -> Result<Option<AssembledFile>> {
        let chunk = ChunkMessage::from_payload(payload)?.validate()?;
        self.handle_chunk(chunk).await
    }

    /// Record one chunk. Returns the assembled file when this chunk
    /// completed its session and the file was persisted.
    pub async fn handle_chunk(&self, chunk: Chunk) -> Result<Option<AssembledFile>> {
        let Chunk {
            file_name,
            index,
            total_chunks,
            payload,
            original_extension,
        } = chunk;

        if total_chunks > self.max_total_chunks {
            return Err(TransferError::Validation(format!(
                "Too many chunks declared for {}: {} (max: {})",
                file_name, total_chunks, self.max_total_chunks
            )));
        }

        if index >= total_chunks {
            return Err(TransferError::Assembly(format!(
                "Chunk index out of bounds for {}: {} (total: {})",
                file_name, index, total_chunks
            )));
        }

        let (handle, mut session) = loop {
            let handle = self.session_for(&file_name, total_chunks, &original_extension);
            let guard = handle.clone().lock_owned().await;
            if !guard.closed {
                break (handle, guard);
            }
            tracing::trace!(file_name = %file_name, "Session closed while waiting, retrying lookup");
        };

        if session.total_chunks != total_chunks {
            return Err(TransferError::Assembly(format!(
                "Chunk for {} declares {} chunks, session expects {}",
                file_name, total_chunks, session.total_chunks
            )));
        }

        session.fill(index, payload);

        if !session.is_complete() {
            return Ok(None);
        }

        tracing::info!("All chunks received for {}, assembling file.", file_name);

        let body = session.assemble();
        let size = body.len();
        let mut metadata = Metadata::new();
        metadata.insert(
            ORIGINAL_EXTENSION_KEY.to_string(),
            session.original_extension.clone(),
        );

        // On failure the session stays complete; a re-delivered chunk retries.
        self.inner.store.put(&file_name, body, metadata).await?;

        self.remove_if_current(&file_name, &handle);
        session.closed = true;

        tracing::info!(
            file_name = %file_name,
            size = size,
            total_chunks = session.total_chunks,
            "File upload successful"
        );

        Ok(Some(AssembledFile {
            file_name,
            original_extension: session.original_extension.clone(),
            size,
            total_chunks: session.total_chunks,
        }))
    }

    /// Fetch the live session handle for a file, creating it on first sight
    fn session_for(
        &self,
        file_name: &str,
        total_chunks: usize,
        original_extension: &str,
    ) -> SessionHandle {
        let mut sessions = self.inner.sessions.lock();
        if let Some(handle) = sessions.get(file_name) {
            return handle.clone();
        }

        tracing::debug!(
            file_name = %file_name,
            total_chunks = total_chunks,
            "Receiving file chunks"
        );
        let handle = Arc::new(Mutex::new(TransferSession::new(
            total_chunks,
            original_extension,
        )));
        sessions.insert(file_name.to_string(), handle.clone());
        handle
    }

    fn remove_if_current(&self, file_name: &str, handle: &SessionHandle) {
        let mut sessions = self.inner.sessions.lock();
        if sessions
            .get(file_name)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            sessions.remove(file_name);
        }
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Number of sessions still collecting chunks
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Received/total counts for a live session
    pub async fn progress(&self, file_name: &str) -> Option<SessionProgress> {
        let handle = self.inner.sessions.lock().get(file_name).cloned()?;
        let session = handle.lock().await;
        (!session.closed).then(|| session.progress())
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Drop sessions idle for longer than the configured TTL.
    ///
    /// Sessions busy with a chunk are skipped. Returns the number evicted.
    pub fn evict_idle(&self) -> usize {
        let Some(ttl) = self.inner.session_ttl else {
            return 0;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let candidates: Vec<(String, SessionHandle)> = self
            .inner
            .sessions
            .lock()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut evicted = 0;
        for (file_name, handle) in candidates {
            let Ok(mut session) = handle.try_lock() else {
                continue;
            };
            if session.closed || session.last_activity >= cutoff {
                continue;
            }

            self.remove_if_current(&file_name, &handle);
            session.closed = true;
            evicted += 1;

            tracing::warn!(
                file_name = %file_name,
                received = session.received,
                total_chunks = session.total_chunks,
                idle_since = %session.last_activity,
                "Evicted idle transfer session"
            );
        }

        if evicted > 0 {
            tracing::info!(count = evicted, "Cleaned up idle transfer sessions");
        }

        evicted
    }

    /// Start background eviction. Returns `None` when no TTL is configured.
    pub fn spawn_eviction_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let ttl = self.inner.session_ttl?;
        let period = (ttl / 2).max(Duration::from_secs(1));
        let engine = self.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                engine.evict_idle();
            }
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::{read_to_end, BlobStream, MemoryStore, ObjectMetadata};
    use crate::transfer::sender::split_chunks;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Memory store that counts puts and can be told to fail them
    #[derive(Default)]
    struct CountingStore {
        store: MemoryStore,
        puts: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait::async_trait]
    impl BlobStore for CountingStore {
        async fn put(
            &self,
            key: &str,
            body: Bytes,
            metadata: Metadata,
        ) -> std::result::Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store offline".to_string()));
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.store.put(key, body, metadata).await
        }

        async fn get(&self, key: &str) -> std::result::Result<BlobStream, StoreError> {
            self.store.get(key).await
        }

        async fn stat(&self, key: &str) -> std::result::Result<ObjectMetadata, StoreError> {
            self.store.stat(key).await
        }
    }

    fn chunks_of(file_name: &str, data: &[u8], chunk_size: usize, ext: &str) -> Vec<Chunk> {
        let pieces = split_chunks(data, chunk_size);
        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| Chunk {
                file_name: file_name.to_string(),
                index,
                total_chunks: total,
                payload: Bytes::copy_from_slice(piece),
                original_extension: ext.to_string(),
            })
            .collect()
    }

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn stored(store: &CountingStore, key: &str) -> Vec<u8> {
        read_to_end(store.get(key).await.unwrap()).await.unwrap()
    }

    /// All orderings of `0..n`
    fn permutations(n: usize) -> Vec<Vec<usize>> {
        fn permute(current: &mut Vec<usize>, k: usize, out: &mut Vec<Vec<usize>>) {
            if k == current.len() {
                out.push(current.clone());
                return;
            }
            for i in k..current.len() {
                current.swap(k, i);
                permute(current, k + 1, out);
                current.swap(k, i);
            }
        }
        let mut out = Vec::new();
        permute(&mut (0..n).collect(), 0, &mut out);
        out
    }

    #[tokio::test]
    async fn test_in_order_assembly() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let data = sample_data(10);

        let chunks = chunks_of("notes", &data, 4, ".txt");
        assert_eq!(chunks.len(), 3);

        assert!(engine.handle_chunk(chunks[0].clone()).await.unwrap().is_none());
        assert!(engine.handle_chunk(chunks[1].clone()).await.unwrap().is_none());
        assert_eq!(
            engine.progress("notes").await,
            Some(SessionProgress { received: 2, total_chunks: 3 })
        );

        let assembled = engine.handle_chunk(chunks[2].clone()).await.unwrap().unwrap();
        assert_eq!(assembled.file_name, "notes");
        assert_eq!(assembled.size, 10);
        assert_eq!(assembled.total_chunks, 3);
        assert_eq!(assembled.original_extension, ".txt");

        assert_eq!(stored(&store, "notes").await, data);
        let stat = store.stat("notes").await.unwrap();
        assert_eq!(stat.original_extension(), Some(".txt"));
        assert_eq!(engine.active_sessions(), 0);
        assert_eq!(engine.progress("notes").await, None);
    }

    #[tokio::test]
    async fn test_every_arrival_order_yields_same_file() {
        let data = sample_data(17);
        let chunks = chunks_of("perm", &data, 5, ".bin");
        assert_eq!(chunks.len(), 4);

        for order in permutations(chunks.len()) {
            let store = Arc::new(CountingStore::default());
            let engine = ReassemblyEngine::new(store.clone());

            let mut completed = 0;
            for &i in &order {
                if engine.handle_chunk(chunks[i].clone()).await.unwrap().is_some() {
                    completed += 1;
                }
            }

            assert_eq!(completed, 1, "order {:?}", order);
            assert_eq!(store.puts.load(Ordering::SeqCst), 1);
            assert_eq!(stored(&store, "perm").await, data, "order {:?}", order);
        }
    }

    #[tokio::test]
    async fn test_single_empty_chunk_completes() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());

        let chunks = chunks_of("empty", &[], 1024, "");
        assert_eq!(chunks.len(), 1);

        let assembled = engine.handle_chunk(chunks[0].clone()).await.unwrap().unwrap();
        assert_eq!(assembled.size, 0);
        assert!(stored(&store, "empty").await.is_empty());
    }

    #[tokio::test]
    async fn test_interleaved_files_do_not_mix() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let a = sample_data(30);
        let b: Vec<u8> = sample_data(25).into_iter().rev().collect();

        let chunks_a = chunks_of("a", &a, 7, ".a");
        let chunks_b = chunks_of("b", &b, 7, ".b");

        for (ca, cb) in chunks_a.iter().rev().zip(chunks_b.iter()) {
            engine.handle_chunk(cb.clone()).await.unwrap();
            engine.handle_chunk(ca.clone()).await.unwrap();
        }
        // a has one more chunk than b
        engine.handle_chunk(chunks_a[0].clone()).await.unwrap();

        assert_eq!(stored(&store, "a").await, a);
        assert_eq!(stored(&store, "b").await, b);
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_redelivered_chunk_is_idempotent() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let data = sample_data(12);
        let chunks = chunks_of("dup", &data, 4, ".txt");

        engine.handle_chunk(chunks[1].clone()).await.unwrap();
        engine.handle_chunk(chunks[1].clone()).await.unwrap();
        assert_eq!(
            engine.progress("dup").await,
            Some(SessionProgress { received: 1, total_chunks: 3 })
        );

        engine.handle_chunk(chunks[0].clone()).await.unwrap();
        engine.handle_chunk(chunks[2].clone()).await.unwrap();
        assert_eq!(stored(&store, "dup").await, data);
    }

    #[tokio::test]
    async fn test_invalid_message_leaves_session_untouched() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let chunks = chunks_of("keep", &sample_data(8), 4, ".txt");
        engine.handle_chunk(chunks[0].clone()).await.unwrap();

        let missing_chunk = br#"{"fileName":"keep","chunkIndex":1,"totalChunks":2}"#;
        let missing_index = br#"{"fileName":"keep","fileChunk":"AAAA","totalChunks":2}"#;
        let missing_total = br#"{"fileName":"keep","fileChunk":"AAAA","chunkIndex":1}"#;
        let missing_name = br#"{"fileChunk":"AAAA","chunkIndex":1,"totalChunks":2}"#;

        let payloads: [&[u8]; 4] = [missing_chunk, missing_index, missing_total, missing_name];
        for payload in payloads {
            assert!(matches!(
                engine.handle_message(payload).await,
                Err(TransferError::Validation(_))
            ));
        }

        assert_eq!(
            engine.progress("keep").await,
            Some(SessionProgress { received: 1, total_chunks: 2 })
        );
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_first_chunk_creates_no_session() {
        let engine = ReassemblyEngine::new(Arc::new(CountingStore::default()));
        let payload = br#"{"fileName":"ghost","chunkIndex":0,"totalChunks":1}"#;

        assert!(engine.handle_message(payload).await.is_err());
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_total_mismatch_is_rejected() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let chunks = chunks_of("mismatch", &sample_data(8), 4, "");
        engine.handle_chunk(chunks[0].clone()).await.unwrap();

        let bogus = Chunk {
            total_chunks: 5,
            index: 4,
            ..chunks[1].clone()
        };
        assert!(matches!(
            engine.handle_chunk(bogus).await,
            Err(TransferError::Assembly(_))
        ));
        assert_eq!(
            engine.progress("mismatch").await,
            Some(SessionProgress { received: 1, total_chunks: 2 })
        );
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_rejected() {
        let engine = ReassemblyEngine::new(Arc::new(CountingStore::default()));
        let chunk = Chunk {
            file_name: "oob".to_string(),
            index: 2,
            total_chunks: 2,
            payload: Bytes::from_static(b"x"),
            original_extension: String::new(),
        };
        assert!(matches!(
            engine.handle_chunk(chunk).await,
            Err(TransferError::Assembly(_))
        ));
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_oversized_total_chunks_is_rejected_before_allocation() {
        let engine = ReassemblyEngine::new(Arc::new(CountingStore::default()));

        let payload = br#"{"fileName":"x","fileChunk":"AA==","chunkIndex":0,"totalChunks":18446744073709551615}"#;
        assert!(matches!(
            engine.handle_message(payload).await,
            Err(TransferError::Validation(_))
        ));
        assert_eq!(engine.active_sessions(), 0);

        let just_over = Chunk {
            file_name: "x".to_string(),
            index: 0,
            total_chunks: chunk_count(DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_CHUNK_SIZE) + 1,
            payload: Bytes::from_static(b"x"),
            original_extension: String::new(),
        };
        assert!(engine.handle_chunk(just_over).await.is_err());
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_configured_chunk_limit_applies() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone()).with_max_total_chunks(3);

        let too_many = chunks_of("wide", &sample_data(16), 4, "");
        assert!(matches!(
            engine.handle_chunk(too_many[0].clone()).await,
            Err(TransferError::Validation(_))
        ));

        let data = sample_data(12);
        for chunk in chunks_of("fits", &data, 4, "") {
            engine.handle_chunk(chunk).await.unwrap();
        }
        assert_eq!(stored(&store, "fits").await, data);
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_250k_file_persists_once_in_any_order() {
        let data = sample_data(250 * 1024);
        let chunks = chunks_of("big", &data, 100 * 1024, ".bin");
        assert_eq!(chunks.len(), 3);

        for order in permutations(chunks.len()) {
            let store = Arc::new(CountingStore::default());
            let engine = ReassemblyEngine::new(store.clone());
            for &i in &order {
                engine.handle_chunk(chunks[i].clone()).await.unwrap();
            }

            assert_eq!(store.puts.load(Ordering::SeqCst), 1, "order {:?}", order);
            let body = stored(&store, "big").await;
            assert_eq!(body.len(), 250 * 1024);
            assert_eq!(body, data);
        }
    }

    #[tokio::test]
    async fn test_failed_persist_is_retried_on_redelivery() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let data = sample_data(8);
        let chunks = chunks_of("retry", &data, 4, ".log");

        engine.handle_chunk(chunks[0].clone()).await.unwrap();
        store.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.handle_chunk(chunks[1].clone()).await,
            Err(TransferError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(engine.active_sessions(), 1);

        store.failing.store(false, Ordering::SeqCst);
        let assembled = engine.handle_chunk(chunks[1].clone()).await.unwrap();
        assert!(assembled.is_some());
        assert_eq!(stored(&store, "retry").await, data);
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_reupload_after_completion_starts_fresh_session() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());

        for chunk in chunks_of("again", b"first version", 4, ".txt") {
            engine.handle_chunk(chunk).await.unwrap();
        }
        for chunk in chunks_of("again", b"second", 4, ".md") {
            engine.handle_chunk(chunk).await.unwrap();
        }

        assert_eq!(stored(&store, "again").await, b"second");
        assert_eq!(
            store.stat("again").await.unwrap().original_extension(),
            Some(".md")
        );
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_final_chunks_persist_once() {
        for round in 0..50 {
            let store = Arc::new(CountingStore::default());
            let engine = ReassemblyEngine::new(store.clone());
            let file_name = format!("race-{}", round);
            let data = sample_data(40);
            let chunks = chunks_of(&file_name, &data, 8, ".bin");
            let n = chunks.len();

            for chunk in &chunks[..n - 2] {
                engine.handle_chunk(chunk.clone()).await.unwrap();
            }

            let barrier = Arc::new(tokio::sync::Barrier::new(2));
            let tasks: Vec<_> = chunks[n - 2..]
                .iter()
                .cloned()
                .map(|chunk| {
                    let engine = engine.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        engine.handle_chunk(chunk).await
                    })
                })
                .collect();

            let mut completions = 0;
            for task in tasks {
                if task.await.unwrap().unwrap().is_some() {
                    completions += 1;
                }
            }

            assert_eq!(completions, 1);
            assert_eq!(store.puts.load(Ordering::SeqCst), 1);
            assert_eq!(stored(&store, &file_name).await, data);
            assert_eq!(engine.active_sessions(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_arrivals_across_files() {
        let store = Arc::new(CountingStore::default());
        let engine = ReassemblyEngine::new(store.clone());
        let files: Vec<(String, Vec<u8>)> = (0..8)
            .map(|i| (format!("file-{}", i), sample_data(100 + i * 13)))
            .collect();

        let mut tasks = Vec::new();
        for (name, data) in &files {
            for chunk in chunks_of(name, data, 9, ".dat").into_iter().rev() {
                let engine = engine.clone();
                tasks.push(tokio::spawn(async move { engine.handle_chunk(chunk).await }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.puts.load(Ordering::SeqCst), files.len());
        for (name, data) in &files {
            assert_eq!(&stored(&store, name).await, data);
        }
        assert_eq!(engine.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_eviction_disabled_without_ttl() {
        let engine = ReassemblyEngine::new(Arc::new(CountingStore::default()));
        let chunks = chunks_of("stalled", &sample_data(8), 4, "");
        engine.handle_chunk(chunks[0].clone()).await.unwrap();

        assert_eq!(engine.evict_idle(), 0);
        assert_eq!(engine.active_sessions(), 1);
        assert!(engine.spawn_eviction_task().is_none());
    }

    #[tokio::test]
    async fn test_idle_session_is_evicted() {
        let store = Arc::new(CountingStore::default());
        let engine =
            ReassemblyEngine::with_session_ttl(store.clone(), Some(Duration::from_millis(20)));
        let data = sample_data(8);
        let chunks = chunks_of("stalled", &data, 4, "");
        engine.handle_chunk(chunks[0].clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.evict_idle(), 1);
        assert_eq!(engine.active_sessions(), 0);

        // A late chunk opens a new session rather than completing the old one.
        assert!(engine.handle_chunk(chunks[1].clone()).await.unwrap().is_none());
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recent_session_survives_eviction() {
        let engine = ReassemblyEngine::with_session_ttl(
            Arc::new(CountingStore::default()),
            Some(Duration::from_secs(3600)),
        );
        let chunks = chunks_of("fresh", &sample_data(8), 4, "");
        engine.handle_chunk(chunks[0].clone()).await.unwrap();

        assert_eq!(engine.evict_idle(), 0);
        assert_eq!(engine.active_sessions(), 1);
    }
}
