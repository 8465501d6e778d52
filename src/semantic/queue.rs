//! Serialized access to the embedding provider.
//!
//! One consumer thread owns the provider and handles jobs in arrival order,
//! pausing `api_delay` after every call. Callers block on a one-shot reply
//! channel, bounded by `reply_timeout` from the moment the job is submitted.

use std::{
    path::PathBuf,
    sync::mpsc,
    thread::sleep,
    time::Duration,
};

use super::embeddings::{EmbeddingError, EmbeddingProvider};

type Reply<T> = mpsc::Sender<Result<T, EmbeddingError>>;

enum Job {
    Images {
        paths: Vec<PathBuf>,
        reply: Reply<Vec<Vec<f32>>>,
    },
    Text {
        query: String,
        reply: Reply<Vec<f32>>,
    },
}

pub struct ProviderQueue;

impl ProviderQueue {
    /// Move `provider` onto its own thread and return a handle to it.
    ///
    /// The thread exits once every handle has been dropped.
    pub fn spawn(
        mut provider: Box<dyn EmbeddingProvider>,
        api_delay: Duration,
        reply_timeout: Duration,
    ) -> std::io::Result<ProviderHandle> {
        let (tx, rx) = mpsc::channel::<Job>();

        std::thread::Builder::new()
            .name("embedding-provider".to_string())
            .spawn(move || {
                log::debug!("embedding queue started ({})", provider.name());
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Images { paths, reply } => {
                            log::debug!("embedding {} images", paths.len());
                            let result = provider.embed_images(&paths);
                            if let Err(e) = &result {
                                log::warn!("image embedding failed: {e}");
                            }
                            // caller may have timed out already
                            let _ = reply.send(result);
                        }
                        Job::Text { query, reply } => {
                            let result = provider.embed_text(&query);
                            if let Err(e) = &result {
                                log::warn!("text embedding failed: {e}");
                            }
                            let _ = reply.send(result);
                        }
                    }

                    if !api_delay.is_zero() {
                        sleep(api_delay);
                    }
                }
                log::debug!("embedding queue stopped");
            })?;

        Ok(ProviderHandle { tx, reply_timeout })
    }
}

#[derive(Clone)]
pub struct ProviderHandle {
    tx: mpsc::Sender<Job>,
    reply_timeout: Duration,
}

impl ProviderHandle {
    pub fn embed_images(&self, paths: Vec<PathBuf>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(Job::Images { paths, reply })
            .map_err(|_| EmbeddingError::QueueClosed)?;
        self.wait(rx)
    }

    pub fn embed_text(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(Job::Text {
                query: query.to_string(),
                reply,
            })
            .map_err(|_| EmbeddingError::QueueClosed)?;
        self.wait(rx)
    }

    fn wait<T>(&self, rx: mpsc::Receiver<Result<T, EmbeddingError>>) -> Result<T, EmbeddingError> {
        match rx.recv_timeout(self.reply_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(EmbeddingError::Timeout(self.reply_timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EmbeddingError::QueueClosed),
        }
    }
}
