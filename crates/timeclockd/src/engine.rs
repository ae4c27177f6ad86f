//! Encoder engine: the ONNX sessions live on one dedicated OS thread.
//!
//! HTTP handlers talk to it through a clone-safe mpsc/oneshot handle;
//! encoding requests queue and run one at a time (CPU-bound), while gallery
//! matching and everything else stays concurrent on the async runtime.

use thiserror::Error;
use timeclock_core::{EncoderError, FaceEmbedder, FaceEncoding};
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("encoder thread exited")]
    ChannelClosed,
}

enum EngineRequest {
    Encode {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<FaceEncoding, EncoderError>>,
    },
}

/// Clone-safe handle to the encoder thread.
#[derive(Clone)]
pub struct EncoderHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EncoderHandle {
    /// Encode an image payload into a face encoding on the engine thread.
    pub async fn encode(&self, image: Vec<u8>) -> Result<FaceEncoding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let result = reply_rx.await.map_err(|_| EngineError::ChannelClosed)?;
        Ok(result?)
    }
}

/// Spawn the encoder on a dedicated OS thread and return its handle.
///
/// The embedder is moved onto the thread; requests drain in FIFO order
/// until every handle is dropped.
pub fn spawn_encoder(mut embedder: impl FaceEmbedder + 'static) -> EncoderHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("timeclock-encoder".into())
        .spawn(move || {
            tracing::info!("encoder thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { image, reply } => {
                        let _ = reply.send(embedder.encode(&image));
                    }
                }
            }
            tracing::info!("encoder thread exiting");
        })
        .expect("failed to spawn encoder thread");

    EncoderHandle { tx }
}
